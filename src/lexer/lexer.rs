use crate::compiler::{Class, Reason, SymbolTable};
use crate::lexer::token::Token;

#[derive(Debug)]
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Lexer<'a> {
        Lexer {
            input,
            position: 0,
            line: 1,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn peek_char(&self) -> u8 {
        if self.position >= self.input.len() {
            0
        } else {
            self.input[self.position]
        }
    }

    fn read_char(&mut self) -> u8 {
        let ch = self.peek_char();
        if ch != 0 {
            self.position += 1;
        }
        ch
    }

    fn read_if_peek(&mut self, ch: u8, yes: Token, no: Token) -> Token {
        if self.peek_char() == ch {
            self.read_char();
            yes
        } else {
            no
        }
    }

    fn read_while(&mut self, predicate: fn(u8) -> bool) -> &'a [u8] {
        let input = self.input;
        let start = self.position;

        while predicate(self.peek_char()) {
            self.position += 1;
        }

        &input[start..self.position]
    }

    fn skip_line(&mut self) {
        self.read_while(|ch| ch != 0 && ch != b'\n');
    }

    fn read_number(&mut self, first: u8) -> i64 {
        if first != b'0' {
            let digits = self.read_while(is_digit);
            return digits
                .iter()
                .fold((first - b'0') as i64, |n, d| {
                    n.wrapping_mul(10).wrapping_add((d - b'0') as i64)
                });
        }

        if self.peek_char() == b'x' || self.peek_char() == b'X' {
            self.read_char();
            self.read_while(is_hex_digit).iter().fold(0i64, |n, d| {
                n.wrapping_mul(16)
                    .wrapping_add((*d as char).to_digit(16).unwrap_or(0) as i64)
            })
        } else {
            self.read_while(is_octal_digit)
                .iter()
                .fold(0i64, |n, d| n.wrapping_mul(8).wrapping_add((d - b'0') as i64))
        }
    }

    // Reads up to the closing `quote`, decoding escapes.
    fn read_literal(&mut self, quote: u8) -> Result<Vec<u8>, Reason> {
        let mut bytes = vec![];

        loop {
            match self.read_char() {
                0 => return Err(Reason::UnterminatedLiteral),
                ch if ch == quote => return Ok(bytes),
                b'\\' => {
                    let escaped = match self.read_char() {
                        0 => return Err(Reason::UnterminatedLiteral),
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'0' => 0,
                        other => other,
                    };
                    bytes.push(escaped);
                }
                ch => bytes.push(ch),
            }
        }
    }

    /// Produces the next token, interning identifiers on the way.
    pub fn next_token(&mut self, symbols: &mut SymbolTable) -> Result<Token, Reason> {
        loop {
            let ch = self.read_char();

            let token = match ch {
                0 => Token::Eof,
                b'\n' => {
                    self.line += 1;
                    continue;
                }
                b'#' => {
                    self.skip_line();
                    continue;
                }
                b'/' if self.peek_char() == b'/' => {
                    self.skip_line();
                    continue;
                }
                _ if (ch as char).is_ascii_whitespace() => continue,
                _ if is_letter(ch) => {
                    let start = self.position - 1;
                    self.read_while(is_ident_letter);
                    let name = String::from_utf8_lossy(&self.input[start..self.position]);
                    let id = symbols.intern(&name)?;

                    match symbols.binding(id).class {
                        Class::Keyword(keyword) => Token::from(keyword),
                        _ => Token::Id(id),
                    }
                }
                _ if is_digit(ch) => Token::Num(self.read_number(ch)),
                b'"' => Token::Str(self.read_literal(b'"')?),
                b'\'' => {
                    let bytes = self.read_literal(b'\'')?;
                    Token::Num(bytes.last().copied().unwrap_or(0) as i64)
                }
                b'=' => self.read_if_peek(b'=', Token::Eq, Token::Assign),
                b'+' => self.read_if_peek(b'+', Token::Inc, Token::Add),
                b'-' => self.read_if_peek(b'-', Token::Dec, Token::Sub),
                b'!' => self.read_if_peek(b'=', Token::Ne, Token::Bang),
                b'<' => match self.peek_char() {
                    b'=' => self.read_if_peek(b'=', Token::Le, Token::Lt),
                    _ => self.read_if_peek(b'<', Token::Shl, Token::Lt),
                },
                b'>' => match self.peek_char() {
                    b'=' => self.read_if_peek(b'=', Token::Ge, Token::Gt),
                    _ => self.read_if_peek(b'>', Token::Shr, Token::Gt),
                },
                b'|' => self.read_if_peek(b'|', Token::Lor, Token::Or),
                b'&' => self.read_if_peek(b'&', Token::Lan, Token::And),
                b'^' => Token::Xor,
                b'%' => Token::Mod,
                b'*' => Token::Mul,
                b'/' => Token::Div,
                b'[' => Token::Brak,
                b'?' => Token::Cond,
                b'~' => Token::Tilde,
                b';' => Token::Semicolon,
                b':' => Token::Colon,
                b',' => Token::Comma,
                b'(' => Token::LParen,
                b')' => Token::RParen,
                b']' => Token::RBracket,
                b'{' => Token::LBrace,
                b'}' => Token::RBrace,
                _ => Token::Illegal(ch),
            };

            return Ok(token);
        }
    }
}

fn is_letter(ch: u8) -> bool {
    (ch as char).is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_letter(ch: u8) -> bool {
    is_letter(ch) || is_digit(ch)
}

fn is_digit(ch: u8) -> bool {
    (ch as char).is_ascii_digit()
}

fn is_hex_digit(ch: u8) -> bool {
    (ch as char).is_ascii_hexdigit()
}

fn is_octal_digit(ch: u8) -> bool {
    (b'0'..=b'7').contains(&ch)
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    fn tokens(input: &str, symbols: &mut SymbolTable) -> Vec<Token> {
        let mut lexer = Lexer::new(input.as_bytes());
        let mut tokens = vec![];

        loop {
            match lexer.next_token(symbols).unwrap() {
                Token::Eof => return tokens,
                token => tokens.push(token),
            }
        }
    }

    #[test]
    fn operators_use_maximal_munch() {
        let mut symbols = SymbolTable::new(100);
        let input = "= == < <= << > >= >> + ++ - -- ! != | || & && ^ % * / [ ] ? : ~ ; , ( ) { }";

        let expected = vec![
            Token::Assign,
            Token::Eq,
            Token::Lt,
            Token::Le,
            Token::Shl,
            Token::Gt,
            Token::Ge,
            Token::Shr,
            Token::Add,
            Token::Inc,
            Token::Sub,
            Token::Dec,
            Token::Bang,
            Token::Ne,
            Token::Or,
            Token::Lor,
            Token::And,
            Token::Lan,
            Token::Xor,
            Token::Mod,
            Token::Mul,
            Token::Div,
            Token::Brak,
            Token::RBracket,
            Token::Cond,
            Token::Colon,
            Token::Tilde,
            Token::Semicolon,
            Token::Comma,
            Token::LParen,
            Token::RParen,
            Token::LBrace,
            Token::RBrace,
        ];

        assert_eq!(tokens(input, &mut symbols), expected)
    }

    #[test]
    fn keywords_and_identifiers() {
        let mut symbols = SymbolTable::new(100);
        let input = "int main() { char *p; void v; while (x) return sizeof(int); }";

        let actual = tokens(input, &mut symbols);
        let main = symbols.lookup("main").unwrap();
        let p = symbols.lookup("p").unwrap();
        let v = symbols.lookup("v").unwrap();
        let x = symbols.lookup("x").unwrap();

        let expected = vec![
            Token::Int,
            Token::Id(main),
            Token::LParen,
            Token::RParen,
            Token::LBrace,
            Token::Char,
            Token::Mul,
            Token::Id(p),
            Token::Semicolon,
            Token::Char,
            Token::Id(v),
            Token::Semicolon,
            Token::While,
            Token::LParen,
            Token::Id(x),
            Token::RParen,
            Token::Return,
            Token::Sizeof,
            Token::LParen,
            Token::Int,
            Token::RParen,
            Token::Semicolon,
            Token::RBrace,
        ];

        assert_eq!(actual, expected)
    }

    #[test_case("42", 42 ; "decimal")]
    #[test_case("0x2A", 42 ; "hexadecimal upper")]
    #[test_case("0xff", 255 ; "hexadecimal lower")]
    #[test_case("052", 42 ; "octal")]
    #[test_case("0", 0 ; "zero")]
    #[test_case("'a'", 97 ; "character")]
    #[test_case("'\\n'", 10 ; "escaped character")]
    fn numbers(input: &str, expected: i64) {
        let mut symbols = SymbolTable::new(100);

        assert_eq!(tokens(input, &mut symbols), vec![Token::Num(expected)])
    }

    #[test]
    fn strings_decode_escapes() {
        let mut symbols = SymbolTable::new(100);

        assert_eq!(
            tokens("\"a\\nb\\\"c\" \"\"", &mut symbols),
            vec![Token::Str(b"a\nb\"c".to_vec()), Token::Str(vec![])]
        )
    }

    #[test]
    fn comments_and_directives_are_skipped_and_lines_counted() {
        let mut symbols = SymbolTable::new(100);
        let mut lexer = Lexer::new(b"#include <stdio.h>\n// comment\n\n  1 / 2");

        assert_eq!(lexer.next_token(&mut symbols), Ok(Token::Num(1)));
        assert_eq!(lexer.line(), 4);
        assert_eq!(lexer.next_token(&mut symbols), Ok(Token::Div));
        assert_eq!(lexer.next_token(&mut symbols), Ok(Token::Num(2)));
        assert_eq!(lexer.next_token(&mut symbols), Ok(Token::Eof));
        assert_eq!(lexer.next_token(&mut symbols), Ok(Token::Eof));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut symbols = SymbolTable::new(100);
        let mut lexer = Lexer::new(b"\"abc");

        assert_eq!(
            lexer.next_token(&mut symbols),
            Err(Reason::UnterminatedLiteral)
        );
    }

    #[test]
    fn illegal_characters_are_reported() {
        let mut symbols = SymbolTable::new(100);

        assert_eq!(tokens("@", &mut symbols), vec![Token::Illegal(b'@')]);
    }
}
