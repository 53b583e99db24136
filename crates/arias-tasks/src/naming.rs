//! Object key templates.
//!
//! Templates may use `{filename}` (base name with extension), `{name}` (base
//! name without the last extension) and `{ext}` (last extension including
//! its dot, or empty).

use std::path::Path;

/// Expand `template` against `filename`.
#[must_use]
pub fn format_filename(template: &str, filename: &str) -> String {
    let (name, ext) = split_extension(filename);
    let mut out = String::with_capacity(template.len() + filename.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let replaced = [("{filename}", filename), ("{name}", name), ("{ext}", ext)]
            .into_iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder));
        match replaced {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Object key for a downloaded file: the expanded template when one is
/// given, otherwise the file's base name. `None` when the path has no file
/// name.
#[must_use]
pub fn object_name(template: Option<&str>, path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?;
    Some(match template {
        Some(template) if !template.is_empty() => format_filename(template, filename),
        _ => filename.to_string(),
    })
}

fn split_extension(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(dot) => filename.split_at(dot),
        None => (filename, ""),
    }
}
