use crate::compiler::{Keyword, SymbolId};

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Eof,
    Illegal(u8),

    // Identifiers and Literals
    Id(SymbolId),
    Num(i64),
    Str(Vec<u8>),

    // Keywords
    Char,
    Else,
    Enum,
    If,
    Int,
    Return,
    Sizeof,
    While,

    // Operators, in precedence order
    Assign,
    Cond,
    Lor,
    Lan,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Inc,
    Dec,
    Brak,

    // Unary only
    Bang,
    Tilde,

    // Delimiters
    Semicolon,
    Colon,
    Comma,
    LParen,
    RParen,
    RBracket,
    LBrace,
    RBrace,
}

impl From<Keyword> for Token {
    fn from(keyword: Keyword) -> Token {
        #[rustfmt::skip]
        let token = match keyword {
            Keyword::Char   => Token::Char,
            Keyword::Else   => Token::Else,
            Keyword::Enum   => Token::Enum,
            Keyword::If     => Token::If,
            Keyword::Int    => Token::Int,
            Keyword::Return => Token::Return,
            Keyword::Sizeof => Token::Sizeof,
            Keyword::While  => Token::While,
        };

        token
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[rustfmt::skip]
        let pretty = match self {
            Token::Illegal(ch) => format!("ILLEGAL: {}", *ch as char),
            Token::Id(id)      => format!("identifier #{}", id),
            Token::Num(n)      => n.to_string(),
            Token::Str(bytes)  => format!("\"{}\"", String::from_utf8_lossy(bytes)),
            Token::Eof       => "EOF".to_string(),
            Token::Char      => "char".to_string(),
            Token::Else      => "else".to_string(),
            Token::Enum      => "enum".to_string(),
            Token::If        => "if".to_string(),
            Token::Int       => "int".to_string(),
            Token::Return    => "return".to_string(),
            Token::Sizeof    => "sizeof".to_string(),
            Token::While     => "while".to_string(),
            Token::Assign    => "=".to_string(),
            Token::Cond      => "?".to_string(),
            Token::Lor       => "||".to_string(),
            Token::Lan       => "&&".to_string(),
            Token::Or        => "|".to_string(),
            Token::Xor       => "^".to_string(),
            Token::And       => "&".to_string(),
            Token::Eq        => "==".to_string(),
            Token::Ne        => "!=".to_string(),
            Token::Lt        => "<".to_string(),
            Token::Gt        => ">".to_string(),
            Token::Le        => "<=".to_string(),
            Token::Ge        => ">=".to_string(),
            Token::Shl       => "<<".to_string(),
            Token::Shr       => ">>".to_string(),
            Token::Add       => "+".to_string(),
            Token::Sub       => "-".to_string(),
            Token::Mul       => "*".to_string(),
            Token::Div       => "/".to_string(),
            Token::Mod       => "%".to_string(),
            Token::Inc       => "++".to_string(),
            Token::Dec       => "--".to_string(),
            Token::Brak      => "[".to_string(),
            Token::Bang      => "!".to_string(),
            Token::Tilde     => "~".to_string(),
            Token::Semicolon => ";".to_string(),
            Token::Colon     => ":".to_string(),
            Token::Comma     => ",".to_string(),
            Token::LParen    => "(".to_string(),
            Token::RParen    => ")".to_string(),
            Token::RBracket  => "]".to_string(),
            Token::LBrace    => "{".to_string(),
            Token::RBrace    => "}".to_string(),
        };

        write!(f, "{}", pretty)
    }
}
