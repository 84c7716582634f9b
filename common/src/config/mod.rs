mod loader;
mod schema;

pub use loader::{load_from_file, validate, ConfigLoadError};
pub use schema::*;
