pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod vm;
