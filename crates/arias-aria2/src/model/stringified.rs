//! Serde adapter for scalars the daemon encodes as JSON strings.
//!
//! Numbers and booleans arrive as `"1024"` / `"true"`; native JSON values are
//! accepted as well so hand-written fixtures stay readable.

use std::fmt::Display;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

pub(crate) fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: Serializer,
{
    serializer.collect_str(value)
}

pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: Deserializer<'de>,
{
    let text = match Repr::deserialize(deserializer)? {
        Repr::Text(text) => text,
        Repr::Number(number) => number.to_string(),
        Repr::Bool(flag) => flag.to_string(),
    };
    text.parse().map_err(D::Error::custom)
}
