/// Local-directory object store.
pub mod fs;
/// HTTP object store speaking plain `PUT`/`HEAD`.
pub mod http;
