use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("unknown instruction at {pc}! cycle = {cycle}")]
    UnknownInstruction { pc: usize, cycle: u64 },
    #[error("segmentation fault: {len} byte(s) at {address:#x}")]
    Segfault { address: i64, len: usize },
    #[error("stack overflow: {capacity} byte stack exhausted")]
    StackOverflow { capacity: usize },
    #[error("division by zero at instruction {pc}")]
    DivisionByZero { pc: usize },
    #[error("could not allocate {requested} bytes for program arguments")]
    OutOfMemory { requested: usize },
    #[error("printf field of {width} characters is too wide")]
    FieldTooWide { width: u64 },
    #[error("output error: {0}")]
    Output(String),
}

impl From<io::Error> for RuntimeError {
    fn from(error: io::Error) -> Self {
        RuntimeError::Output(error.to_string())
    }
}
