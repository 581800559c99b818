mod error;
mod host;
mod memory;
mod printf;
mod vm;

pub use error::{Result, RuntimeError};
pub use host::Host;
pub use memory::{Memory, DATA_BASE, WORD};
pub use printf::format;
pub use vm::VirtualMachine;
