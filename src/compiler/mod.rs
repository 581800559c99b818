mod compiler;
mod error;
mod op;
mod symbol;
mod types;

pub use compiler::{compile, ByteCode, Compiler};
pub use error::{CompileError, Reason, Region, Result};
pub use op::{Address, DecodeError, Op, Syscall};
pub use symbol::{Binding, Class, Keyword, Symbol, SymbolId, SymbolTable, ENTRY};
pub use types::Type;
