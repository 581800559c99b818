use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Debug, PartialEq, Eq, Error)]
#[error("{line}: {reason}")]
pub struct CompileError {
    pub line: usize,
    pub reason: Reason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Symbols,
    Code,
    Data,
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Symbols => write!(f, "symbol"),
            Region::Code => write!(f, "text"),
            Region::Data => write!(f, "data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Reason {
    #[error("unexpected eof in expression")]
    UnexpectedEof,
    #[error("unterminated literal")]
    UnterminatedLiteral,
    #[error("open paren expected")]
    OpenParenExpected,
    #[error("close paren expected")]
    CloseParenExpected,
    #[error("close bracket expected")]
    CloseBracketExpected,
    #[error("semicolon expected (tk: '{0}')")]
    SemicolonExpected(String),
    #[error("conditional missing colon")]
    ColonExpected,
    #[error("open paren expected in sizeof")]
    SizeofOpenParen,
    #[error("close paren expected in sizeof")]
    SizeofCloseParen,
    #[error("bad cast")]
    BadCast,
    #[error("bad dereference")]
    BadDereference,
    #[error("bad address-of")]
    BadAddressOf,
    #[error("bad lvalue in {0}")]
    BadLvalue(&'static str),
    #[error("pointer type expected")]
    PointerExpected,
    #[error("bad expression (tk: '{0}')")]
    BadExpression(String),
    #[error("bad function call: {0}")]
    BadFunctionCall(String),
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("bad enum identifier")]
    BadEnumIdentifier,
    #[error("bad enum initializer")]
    BadEnumInitializer,
    #[error("bad global declaration")]
    BadGlobalDeclaration,
    #[error("duplicate global definition: {0}")]
    DuplicateGlobal(String),
    #[error("bad parameter declaration")]
    BadParameterDeclaration,
    #[error("duplicate parameter definition: {0}")]
    DuplicateParameter(String),
    #[error("bad function definition")]
    BadFunctionDefinition,
    #[error("bad local declaration")]
    BadLocalDeclaration,
    #[error("duplicate local definition: {0}")]
    DuplicateLocal(String),
    #[error("main() not defined")]
    MainNotDefined,
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
    #[error("{region} area exceeded: capacity {capacity}")]
    CapacityExceeded { region: Region, capacity: usize },
    #[error("listing output failed: {0}")]
    Listing(String),
}
