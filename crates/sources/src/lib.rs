mod expand;
mod load;
mod merge;
mod validate;

pub use expand::expand_repeats;
pub use load::{load, load_file, LoadError};
pub use merge::overlay;
pub use validate::{build, validate, BuildOptions, ModuleSchemas, SchemaSource};
