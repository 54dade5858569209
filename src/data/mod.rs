//! Structured sample data helpers

pub mod path;

pub use path::{nest_dotted, resolve_number, resolve_path, split_path};
