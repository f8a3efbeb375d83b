mod errors;
mod schema;
mod scope;
mod walk;

pub use errors::{Error, Errors, ScopedError};
pub use schema::{Property, Schema};
pub use scope::Scope;
pub use walk::walk;

/// Maximum edit distance at which an unknown key proposes its closest
/// expected key.
pub const SUGGEST_DISTANCE: usize = 2;
