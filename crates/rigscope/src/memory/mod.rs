mod process;
mod reader;

// Mock memory for unit and integration tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use process::ProcessHandle;
pub use reader::{MemoryAccess, MemoryReader, Readout, StringLayout};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockMemory, MockMemoryBuilder, MockScene};
