use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compiler::CompileError;
use crate::vm::RuntimeError;

pub type Result<T> = std::result::Result<T, C4Error>;

/// Status reported for every failure of the toolchain itself, as opposed to
/// the status a program passes to `exit`.
pub const FAILURE_STATUS: i32 = -1;

#[derive(Debug, Error)]
pub enum C4Error {
    #[error("usage: {0}")]
    Usage(String),
    #[error("could not open({}): {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("could not read source: more than {capacity} bytes")]
    SourceTooLarge { capacity: usize },
    #[error("output error: {0}")]
    Output(#[from] io::Error),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}
