mod loader;
mod table;

pub use loader::*;
pub use table::*;
