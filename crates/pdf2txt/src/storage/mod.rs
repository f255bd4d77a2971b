pub mod filesystem;

pub use filesystem::{discard_result, remove_source, sanitize_label, ResultStore};
