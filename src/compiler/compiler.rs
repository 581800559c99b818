use crate::compiler::error::{CompileError, Reason, Region, Result};
use crate::compiler::{Address, Binding, Class, Op, SymbolId, SymbolTable, Type};
use crate::config::Limits;
use crate::diagnostics;
use crate::lexer::{Lexer, Token};
use crate::vm::{DATA_BASE, WORD};

use std::io::Write;

use tracing::debug;

// Deepest expression or statement nesting accepted before compiling gives up.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Assign,     // =
    Cond,       // ?:
    Lor,        // ||
    Lan,        // &&
    Or,         // |
    Xor,        // ^
    And,        // &
    Equality,   // == !=
    Relational, // < > <= >=
    Shift,      // << >>
    Sum,        // + -
    Product,    // * / %
    Postfix,    // ++ -- []
}

impl Precedence {
    fn precedence(token: &Token) -> Precedence {
        match token {
            Token::Assign => Precedence::Assign,
            Token::Cond => Precedence::Cond,
            Token::Lor => Precedence::Lor,
            Token::Lan => Precedence::Lan,
            Token::Or => Precedence::Or,
            Token::Xor => Precedence::Xor,
            Token::And => Precedence::And,
            Token::Eq | Token::Ne => Precedence::Equality,
            Token::Lt | Token::Gt | Token::Le | Token::Ge => Precedence::Relational,
            Token::Shl | Token::Shr => Precedence::Shift,
            Token::Add | Token::Sub => Precedence::Sum,
            Token::Mul | Token::Div | Token::Mod => Precedence::Product,
            Token::Inc | Token::Dec | Token::Brak => Precedence::Postfix,
            _ => Precedence::Lowest,
        }
    }
}

/// Output of a successful compilation.
#[derive(Debug, Clone)]
pub struct ByteCode {
    pub code: Vec<Op>,
    pub data: Vec<u8>,
    pub symbols: SymbolTable,
    pub entry: SymbolId,
}

impl ByteCode {
    pub fn words(&self) -> Vec<i64> {
        let mut words = vec![];
        self.code.iter().for_each(|op| op.encode(&mut words));
        words
    }
}

// Source lines echoed so far and the code already printed beneath them.
struct Listing<'a> {
    out: Box<dyn Write + 'a>,
    line: usize,
    position: usize,
    flushed: usize,
}

/*
   Invariant:
   (1) A parsing function is only called if `current` holds the first token
     of the associated grammar rule.

   (2) If a parsing function returns Ok(...), `current` holds the first
     token after the rule, every instruction for the rule has been emitted
     and `ty` is the type of the value left in the accumulator.
*/
pub struct Compiler<'a> {
    source: &'a [u8],
    lexer: Lexer<'a>,
    current: Token,
    symbols: SymbolTable,
    code: Vec<Op>,
    code_words: usize,
    data: Vec<u8>,
    limits: Limits,
    ty: Type,
    loc: i64,
    depth: usize,
    listing: Option<Listing<'a>>,
}

impl<'a> Compiler<'a> {
    pub fn new(source: &'a [u8], limits: Limits) -> Compiler<'a> {
        Compiler {
            source,
            lexer: Lexer::new(source),
            current: Token::Eof,
            symbols: SymbolTable::new(limits.symbols),
            code: vec![],
            code_words: 0,
            data: vec![],
            limits,
            ty: Type::INT,
            loc: 0,
            depth: 0,
            listing: None,
        }
    }

    /// Echo every source line together with the instructions emitted for it.
    pub fn with_listing(mut self, out: Box<dyn Write + 'a>) -> Compiler<'a> {
        self.listing = Some(Listing {
            out,
            line: 1,
            position: 0,
            flushed: 0,
        });
        self
    }

    pub fn compile(mut self) -> Result<ByteCode> {
        self.advance()?;

        while self.current != Token::Eof {
            self.compile_declaration()?;
        }

        self.flush_listing(true)?;

        let entry = self.symbols.entry();
        if self.symbols.binding(entry).class != Class::Fun {
            return Err(self.error(Reason::MainNotDefined));
        }

        debug!(
            code_words = self.code_words,
            data_bytes = self.data.len(),
            symbols = self.symbols.len(),
            "compiled"
        );

        Ok(ByteCode {
            code: self.code,
            data: self.data,
            symbols: self.symbols,
            entry,
        })
    }

    fn error(&self, reason: Reason) -> CompileError {
        CompileError {
            line: self.lexer.line(),
            reason,
        }
    }

    fn advance(&mut self) -> Result<()> {
        let token = self
            .lexer
            .next_token(&mut self.symbols)
            .map_err(|reason| CompileError {
                line: self.lexer.line(),
                reason,
            })?;
        self.current = token;
        self.flush_listing(false)
    }

    fn advance_if(&mut self, token: &Token, reason: Reason) -> Result<()> {
        if &self.current == token {
            self.advance()
        } else {
            Err(self.error(reason))
        }
    }

    fn current_name(&self) -> String {
        match &self.current {
            Token::Id(id) => self.symbols.name(*id).to_string(),
            token => token.to_string(),
        }
    }

    // Prints every source line the lexer has moved past, each followed by
    // the instructions emitted since the previous one.
    fn flush_listing(&mut self, finished: bool) -> Result<()> {
        let listing = match self.listing.as_mut() {
            Some(listing) => listing,
            None => return Ok(()),
        };

        let last = if finished {
            self.lexer.line() + 1
        } else {
            self.lexer.line()
        };

        while listing.line < last && listing.position < self.source.len() {
            let rest = &self.source[listing.position..];
            let end = rest
                .iter()
                .position(|ch| *ch == b'\n')
                .map_or(rest.len(), |n| n + 1);
            let mut text = format!("{}: {}", listing.line, String::from_utf8_lossy(&rest[..end]));
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&diagnostics::listing(&self.code[listing.flushed..]));

            let line = listing.line;
            listing
                .out
                .write_all(text.as_bytes())
                .map_err(|err| CompileError {
                    line,
                    reason: Reason::Listing(err.to_string()),
                })?;

            listing.flushed = self.code.len();
            listing.position += end;
            listing.line += 1;
        }

        Ok(())
    }

    fn emit(&mut self, op: Op) -> Result<Address> {
        if self.code_words + op.width() > self.limits.code {
            return Err(self.error(Reason::CapacityExceeded {
                region: Region::Code,
                capacity: self.limits.code,
            }));
        }

        self.code_words += op.width();
        self.code.push(op);
        Ok(self.code.len() - 1)
    }

    fn here(&self) -> Address {
        self.code.len()
    }

    // Backfills the target of a branch emitted with a placeholder.
    fn patch(&mut self, at: Address, target: Address) {
        self.code[at] = match self.code[at] {
            Op::Bz(_) => Op::Bz(target),
            Op::Bnz(_) => Op::Bnz(target),
            Op::Jmp(_) => Op::Jmp(target),
            op => op,
        };
    }

    // The lvalue rule: the value just loaded becomes the address to store to.
    fn load_to_push(&mut self) -> Option<Op> {
        match self.code.last().copied() {
            Some(load @ Op::Li) | Some(load @ Op::Lc) => {
                if let Some(last) = self.code.last_mut() {
                    *last = Op::Psh;
                }
                Some(load)
            }
            _ => None,
        }
    }

    fn data_address(&self) -> i64 {
        DATA_BASE + self.data.len() as i64
    }

    fn store_data(&mut self, bytes: &[u8]) -> Result<()> {
        if self.data.len() + bytes.len() > self.limits.data {
            return Err(self.error(Reason::CapacityExceeded {
                region: Region::Data,
                capacity: self.limits.data,
            }));
        }

        self.data.extend_from_slice(bytes);
        Ok(())
    }

    // Terminates the string and pads the data cursor to the next word.
    fn align_data(&mut self) -> Result<()> {
        let word = WORD as usize;
        let padding = word - self.data.len() % word;
        self.store_data(&vec![0; padding])
    }

    // <base_type> := int | char | void
    fn base_type(&mut self) -> Result<Option<Type>> {
        let ty = match self.current {
            Token::Int => Type::INT,
            Token::Char => Type::CHAR,
            _ => return Ok(None),
        };

        self.advance()?; // advance over the base type
        Ok(Some(ty))
    }

    // <*>*
    fn pointer_levels(&mut self, mut ty: Type) -> Result<Type> {
        while self.current == Token::Mul {
            self.advance()?; // advance over `Token::Mul`
            ty = ty.pointer_to();
        }

        Ok(ty)
    }

    // <enum_decl> | <base_type>? (<declarator> <,>?)* <;>
    fn compile_declaration(&mut self) -> Result<()> {
        let base = match self.current {
            Token::Enum => {
                self.compile_enum()?;
                Type::INT
            }
            _ => self.base_type()?.unwrap_or(Type::INT),
        };

        while self.current != Token::Semicolon && self.current != Token::RBrace {
            let ty = self.pointer_levels(base)?;

            let id = match self.current {
                Token::Id(id) => id,
                _ => return Err(self.error(Reason::BadGlobalDeclaration)),
            };
            self.advance()?; // advance over `Token::Id(...)`

            if self.current == Token::LParen {
                self.compile_function(id, ty)?;
            } else {
                self.compile_global(id, ty)?;
            }

            if self.current == Token::Comma {
                self.advance()?;
            }
        }

        self.advance() // advance over `Token::Semicolon` or `Token::RBrace`
    }

    // <enum> <name>? <{> (<name> (<=> <num>)? <,>?)* <}>
    fn compile_enum(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::Enum`

        if self.current != Token::LBrace {
            self.advance()?; // advance over the enum's name
        }

        if self.current != Token::LBrace {
            return Ok(());
        }
        self.advance()?; // advance over `Token::LBrace`

        let mut value = 0;
        while self.current != Token::RBrace {
            let id = match self.current {
                Token::Id(id) => id,
                _ => return Err(self.error(Reason::BadEnumIdentifier)),
            };
            self.advance()?;

            if self.current == Token::Assign {
                self.advance()?;
                value = match self.current {
                    Token::Num(n) => n,
                    _ => return Err(self.error(Reason::BadEnumInitializer)),
                };
                self.advance()?;
            }

            if !self.symbols.define(id, Binding::new(Class::Num, Type::INT, value)) {
                return Err(self.error(Reason::DuplicateGlobal(self.symbols.name(id).to_string())));
            }
            value += 1;

            if self.current == Token::Comma {
                self.advance()?;
            }
        }

        self.advance() // advance over `Token::RBrace`
    }

    fn compile_global(&mut self, id: SymbolId, ty: Type) -> Result<()> {
        let address = self.data_address();
        if !self.symbols.define(id, Binding::new(Class::Glo, ty, address)) {
            return Err(self.error(Reason::DuplicateGlobal(self.symbols.name(id).to_string())));
        }

        self.store_data(&[0; WORD as usize])
    }

    // <(> (<base_type>? <*>* <name> <,>?)* <)> <{> <locals> <stmt>*
    //
    // Leaves `current` on the closing brace, which the enclosing declaration
    // consumes.
    fn compile_function(&mut self, id: SymbolId, ty: Type) -> Result<()> {
        // A host service keeps its binding; the body below is unreachable.
        let entry = self.here() as i64;
        self.symbols.define(id, Binding::new(Class::Fun, ty, entry));

        self.advance()?; // advance over `Token::LParen`
        self.symbols.enter_scope();

        let mut slot = 0;
        while self.current != Token::RParen {
            let base = self.base_type()?.unwrap_or(Type::INT);
            let ty = self.pointer_levels(base)?;

            let param = match self.current {
                Token::Id(param) => param,
                _ => return Err(self.error(Reason::BadParameterDeclaration)),
            };
            if !self.symbols.declare_local(param, ty, slot) {
                let name = self.symbols.name(param).to_string();
                return Err(self.error(Reason::DuplicateParameter(name)));
            }
            slot += 1;
            self.advance()?;

            if self.current == Token::Comma {
                self.advance()?;
            }
        }
        self.advance()?; // advance over `Token::RParen`

        if self.current != Token::LBrace {
            return Err(self.error(Reason::BadFunctionDefinition));
        }
        slot += 1;
        self.loc = slot;
        self.advance()?; // advance over `Token::LBrace`

        while let Some(base) = self.base_type()? {
            while self.current != Token::Semicolon {
                let ty = self.pointer_levels(base)?;

                let local = match self.current {
                    Token::Id(local) => local,
                    _ => return Err(self.error(Reason::BadLocalDeclaration)),
                };
                slot += 1;
                if !self.symbols.declare_local(local, ty, slot) {
                    let name = self.symbols.name(local).to_string();
                    return Err(self.error(Reason::DuplicateLocal(name)));
                }
                self.advance()?;

                if self.current == Token::Comma {
                    self.advance()?;
                }
            }
            self.advance()?; // advance over `Token::Semicolon`
        }

        self.emit(Op::Ent(slot - self.loc))?;

        while self.current != Token::RBrace {
            if self.current == Token::Eof {
                return Err(self.error(Reason::UnexpectedEof));
            }
            self.compile_stmt()?;
        }

        self.emit(Op::Lev)?;
        self.symbols.leave_scope();

        Ok(())
    }

    // Runs `compile` one nesting level deeper. Both statements and
    // expressions recurse on the native stack, so their depth is bounded.
    fn nested(&mut self, compile: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(Reason::NestingTooDeep(MAX_NESTING)));
        }

        self.depth += 1;
        let result = compile(self);
        self.depth -= 1;
        result
    }

    fn compile_stmt(&mut self) -> Result<()> {
        self.nested(|this| this.compile_stmt_kind())
    }

    // <if_stmt> | <while_stmt> | <return_stmt> | <block> | <;> | <expr><;>
    fn compile_stmt_kind(&mut self) -> Result<()> {
        match self.current {
            Token::If => self.compile_if_stmt(),
            Token::While => self.compile_while_stmt(),
            Token::Return => self.compile_return_stmt(),
            Token::LBrace => self.compile_block(),
            Token::Semicolon => self.advance(),
            _ => {
                self.compile_expr(Precedence::Assign)?;
                let found = self.current_name();
                self.advance_if(&Token::Semicolon, Reason::SemicolonExpected(found))
            }
        }
    }

    // <(><expr><)>
    fn compile_condition(&mut self) -> Result<()> {
        self.advance_if(&Token::LParen, Reason::OpenParenExpected)?;
        self.compile_expr(Precedence::Assign)?;
        self.advance_if(&Token::RParen, Reason::CloseParenExpected)
    }

    // <if> <condition> <stmt> (<else> <stmt>)?
    fn compile_if_stmt(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::If`

        self.compile_condition()?;
        let mut branch = self.emit(Op::Bz(0))?;
        self.compile_stmt()?;

        if self.current == Token::Else {
            let jump = self.emit(Op::Jmp(0))?;
            self.patch(branch, self.here());
            branch = jump;

            self.advance()?; // advance over `Token::Else`
            self.compile_stmt()?;
        }

        self.patch(branch, self.here());
        Ok(())
    }

    // <while> <condition> <stmt>
    fn compile_while_stmt(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::While`

        let head = self.here();
        self.compile_condition()?;
        let exit = self.emit(Op::Bz(0))?;
        self.compile_stmt()?;
        self.emit(Op::Jmp(head))?;
        self.patch(exit, self.here());

        Ok(())
    }

    // <return> <expr>? <;>
    fn compile_return_stmt(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::Return`

        if self.current != Token::Semicolon {
            self.compile_expr(Precedence::Assign)?;
        }
        self.emit(Op::Lev)?;

        let found = self.current_name();
        self.advance_if(&Token::Semicolon, Reason::SemicolonExpected(found))
    }

    // <{> <stmt>* <}>
    fn compile_block(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::LBrace`

        while self.current != Token::RBrace {
            if self.current == Token::Eof {
                return Err(self.error(Reason::UnexpectedEof));
            }
            self.compile_stmt()?;
        }

        self.advance() // advance over `Token::RBrace`
    }

    fn compile_expr(&mut self, precedence: Precedence) -> Result<()> {
        self.nested(|this| this.compile_operators(precedence))
    }

    // <unary> (<op> <expr>)*
    fn compile_operators(&mut self, precedence: Precedence) -> Result<()> {
        self.compile_unary()?;

        while Precedence::precedence(&self.current) >= precedence {
            let left = self.ty;
            let token = self.current.clone();
            self.advance()?; // advance over the operator

            match token {
                Token::Assign => {
                    if self.load_to_push().is_none() {
                        return Err(self.error(Reason::BadLvalue("assignment")));
                    }
                    self.compile_expr(Precedence::Assign)?;
                    self.ty = left;
                    self.emit(left.store())?;
                }
                Token::Cond => {
                    let branch = self.emit(Op::Bz(0))?;
                    self.compile_expr(Precedence::Assign)?;
                    self.advance_if(&Token::Colon, Reason::ColonExpected)?;
                    let jump = self.emit(Op::Jmp(0))?;
                    self.patch(branch, self.here());
                    self.compile_expr(Precedence::Cond)?;
                    self.patch(jump, self.here());
                }
                Token::Lor => self.compile_short_circuit(Op::Bnz(0), Precedence::Lan)?,
                Token::Lan => self.compile_short_circuit(Op::Bz(0), Precedence::Or)?,
                Token::Or => self.compile_binary(Op::Or, Precedence::Xor)?,
                Token::Xor => self.compile_binary(Op::Xor, Precedence::And)?,
                Token::And => self.compile_binary(Op::And, Precedence::Equality)?,
                Token::Eq => self.compile_binary(Op::Eq, Precedence::Relational)?,
                Token::Ne => self.compile_binary(Op::Ne, Precedence::Relational)?,
                Token::Lt => self.compile_binary(Op::Lt, Precedence::Shift)?,
                Token::Gt => self.compile_binary(Op::Gt, Precedence::Shift)?,
                Token::Le => self.compile_binary(Op::Le, Precedence::Shift)?,
                Token::Ge => self.compile_binary(Op::Ge, Precedence::Shift)?,
                Token::Shl => self.compile_binary(Op::Shl, Precedence::Sum)?,
                Token::Shr => self.compile_binary(Op::Shr, Precedence::Sum)?,
                Token::Add => {
                    self.emit(Op::Psh)?;
                    self.compile_expr(Precedence::Product)?;
                    self.ty = left;
                    if left.scales() {
                        self.emit_scale(Op::Mul)?;
                    }
                    self.emit(Op::Add)?;
                }
                Token::Sub => {
                    self.emit(Op::Psh)?;
                    self.compile_expr(Precedence::Product)?;
                    if left.scales() && left == self.ty {
                        self.emit(Op::Sub)?;
                        self.emit_scale(Op::Div)?;
                        self.ty = Type::INT;
                    } else {
                        self.ty = left;
                        if left.scales() {
                            self.emit_scale(Op::Mul)?;
                        }
                        self.emit(Op::Sub)?;
                    }
                }
                Token::Mul => self.compile_binary(Op::Mul, Precedence::Postfix)?,
                Token::Div => self.compile_binary(Op::Div, Precedence::Postfix)?,
                Token::Mod => self.compile_binary(Op::Mod, Precedence::Postfix)?,
                Token::Inc | Token::Dec => {
                    let load = self
                        .load_to_push()
                        .ok_or_else(|| self.error(Reason::BadLvalue("post-increment")))?;
                    let (apply, undo) = if token == Token::Inc {
                        (Op::Add, Op::Sub)
                    } else {
                        (Op::Sub, Op::Add)
                    };
                    self.emit(load)?;
                    self.emit(Op::Psh)?;
                    self.emit(Op::Imm(self.ty.step()))?;
                    self.emit(apply)?;
                    self.emit(self.ty.store())?;
                    self.emit(Op::Psh)?;
                    self.emit(Op::Imm(self.ty.step()))?;
                    self.emit(undo)?;
                }
                Token::Brak => {
                    self.emit(Op::Psh)?;
                    self.compile_expr(Precedence::Assign)?;
                    self.advance_if(&Token::RBracket, Reason::CloseBracketExpected)?;
                    if left.scales() {
                        self.emit_scale(Op::Mul)?;
                    } else if !left.is_pointer() {
                        return Err(self.error(Reason::PointerExpected));
                    }
                    self.emit(Op::Add)?;
                    self.ty = left.deref().unwrap_or(Type::CHAR);
                    self.emit(self.ty.load())?;
                }
                token => return Err(self.error(Reason::BadExpression(token.to_string()))),
            }
        }

        Ok(())
    }

    fn compile_binary(&mut self, op: Op, precedence: Precedence) -> Result<()> {
        self.emit(Op::Psh)?;
        self.compile_expr(precedence)?;
        self.emit(op)?;
        self.ty = Type::INT;
        Ok(())
    }

    fn compile_short_circuit(&mut self, branch: Op, precedence: Precedence) -> Result<()> {
        let branch = self.emit(branch)?;
        self.compile_expr(precedence)?;
        self.patch(branch, self.here());
        self.ty = Type::INT;
        Ok(())
    }

    // Multiplies or divides the accumulator by the word size, keeping the
    // other operand on the stack.
    fn emit_scale(&mut self, op: Op) -> Result<()> {
        self.emit(Op::Psh)?;
        self.emit(Op::Imm(WORD))?;
        self.emit(op)?;
        Ok(())
    }

    // Primary terms and prefix operators.
    fn compile_unary(&mut self) -> Result<()> {
        let token = self.current.clone();

        match token {
            Token::Eof => return Err(self.error(Reason::UnexpectedEof)),
            Token::Num(n) => {
                self.advance()?;
                self.emit(Op::Imm(n))?;
                self.ty = Type::INT;
            }
            Token::Str(_) => self.compile_string()?,
            Token::Sizeof => self.compile_sizeof()?,
            Token::Id(id) => {
                self.advance()?; // advance over `Token::Id(...)`
                if self.current == Token::LParen {
                    self.compile_call(id)?;
                } else {
                    self.compile_variable(id)?;
                }
            }
            Token::LParen => {
                self.advance()?; // advance over `Token::LParen`
                match self.base_type()? {
                    Some(base) => {
                        let cast = self.pointer_levels(base)?;
                        self.advance_if(&Token::RParen, Reason::BadCast)?;
                        self.compile_expr(Precedence::Postfix)?;
                        self.ty = cast;
                    }
                    None => {
                        self.compile_expr(Precedence::Assign)?;
                        self.advance_if(&Token::RParen, Reason::CloseParenExpected)?;
                    }
                }
            }
            Token::Mul => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                self.ty = self
                    .ty
                    .deref()
                    .ok_or_else(|| self.error(Reason::BadDereference))?;
                self.emit(self.ty.load())?;
            }
            Token::And => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                match self.code.last() {
                    Some(Op::Li) | Some(Op::Lc) => {
                        self.code.pop();
                        self.code_words -= 1;
                    }
                    _ => return Err(self.error(Reason::BadAddressOf)),
                }
                self.ty = self.ty.pointer_to();
            }
            Token::Bang => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                self.emit(Op::Psh)?;
                self.emit(Op::Imm(0))?;
                self.emit(Op::Eq)?;
                self.ty = Type::INT;
            }
            Token::Tilde => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                self.emit(Op::Psh)?;
                self.emit(Op::Imm(-1))?;
                self.emit(Op::Xor)?;
                self.ty = Type::INT;
            }
            Token::Add => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                self.ty = Type::INT;
            }
            Token::Sub => {
                self.advance()?;
                if let Token::Num(n) = self.current {
                    self.emit(Op::Imm(n.wrapping_neg()))?;
                    self.advance()?;
                } else {
                    self.emit(Op::Imm(-1))?;
                    self.emit(Op::Psh)?;
                    self.compile_expr(Precedence::Postfix)?;
                    self.emit(Op::Mul)?;
                }
                self.ty = Type::INT;
            }
            Token::Inc | Token::Dec => {
                self.advance()?;
                self.compile_expr(Precedence::Postfix)?;
                let load = self
                    .load_to_push()
                    .ok_or_else(|| self.error(Reason::BadLvalue("pre-increment")))?;
                self.emit(load)?;
                self.emit(Op::Psh)?;
                self.emit(Op::Imm(self.ty.step()))?;
                self.emit(if token == Token::Inc { Op::Add } else { Op::Sub })?;
                self.emit(self.ty.store())?;
            }
            token => return Err(self.error(Reason::BadExpression(token.to_string()))),
        }

        Ok(())
    }

    // Adjacent literals share one allocation.
    fn compile_string(&mut self) -> Result<()> {
        let address = self.data_address();

        while let Token::Str(bytes) = &self.current {
            let bytes = bytes.clone();
            self.store_data(&bytes)?;
            self.advance()?;
        }
        self.align_data()?;

        self.emit(Op::Imm(address))?;
        self.ty = Type::CHAR.pointer_to();
        Ok(())
    }

    // <sizeof> <(> <base_type> <*>* <)>
    fn compile_sizeof(&mut self) -> Result<()> {
        self.advance()?; // advance over `Token::Sizeof`
        self.advance_if(&Token::LParen, Reason::SizeofOpenParen)?;

        let base = self.base_type()?.unwrap_or(Type::INT);
        let ty = self.pointer_levels(base)?;
        self.advance_if(&Token::RParen, Reason::SizeofCloseParen)?;

        self.emit(Op::Imm(ty.size()))?;
        self.ty = Type::INT;
        Ok(())
    }

    // <name> <(> (<expr> <,>?)* <)>
    fn compile_call(&mut self, id: SymbolId) -> Result<()> {
        self.advance()?; // advance over `Token::LParen`

        let mut args = 0;
        while self.current != Token::RParen {
            self.compile_expr(Precedence::Assign)?;
            self.emit(Op::Psh)?;
            args += 1;

            if self.current == Token::Comma {
                self.advance()?;
            }
        }
        self.advance()?; // advance over `Token::RParen`

        let binding = self.symbols.binding(id);
        match binding.class {
            Class::Sys(call) => self.emit(Op::Sys(call))?,
            Class::Fun => self.emit(Op::Jsr(binding.val as Address))?,
            Class::Glo => self.emit(Op::Jsri(binding.val))?,
            Class::Loc => self.emit(Op::Jsrs(self.loc - binding.val))?,
            _ => {
                let name = self.symbols.name(id).to_string();
                return Err(self.error(Reason::BadFunctionCall(name)));
            }
        };

        if args > 0 {
            self.emit(Op::Adj(args))?;
        }
        self.ty = binding.ty;
        Ok(())
    }

    fn compile_variable(&mut self, id: SymbolId) -> Result<()> {
        let binding = self.symbols.binding(id);

        match binding.class {
            Class::Num => {
                self.emit(Op::Imm(binding.val))?;
                self.ty = Type::INT;
                return Ok(());
            }
            Class::Loc => self.emit(Op::Lea(self.loc - binding.val))?,
            Class::Glo | Class::Fun => self.emit(Op::Imm(binding.val))?,
            _ => {
                let name = self.symbols.name(id).to_string();
                return Err(self.error(Reason::UndefinedVariable(name)));
            }
        };

        self.ty = binding.ty;
        self.emit(self.ty.load())?;
        Ok(())
    }
}

/// Compiles a whole program with default listing settings.
pub fn compile(source: &[u8], limits: Limits) -> Result<ByteCode> {
    Compiler::new(source, limits).compile()
}

#[cfg(test)]
mod tests {
    use super::*;

    use itertools::Itertools;
    use test_case::test_case;

    fn compile_ok(source: &str) -> ByteCode {
        compile(source.as_bytes(), Limits::default()).unwrap()
    }

    fn function_code(byte_code: &ByteCode, name: &str) -> Vec<Op> {
        let id = byte_code.symbols.lookup(name).unwrap();
        let start = byte_code.symbols.binding(id).val as usize;
        let end = byte_code.code[start..]
            .iter()
            .tuple_windows()
            .position(|(a, b)| *a == Op::Lev && *b == Op::Lev)
            .map_or(byte_code.code.len(), |n| start + n + 2);

        byte_code.code[start..end].to_vec()
    }

    #[test]
    fn arithmetic() {
        let byte_code = compile_ok("int main() { return 1 + 2; }");

        #[rustfmt::skip]
        let expected = vec![
            Op::Ent(0),
            Op::Imm(1), Op::Psh, Op::Imm(2), Op::Add,
            Op::Lev,
            Op::Lev,
        ];

        assert_eq!(byte_code.code, expected);
        assert_eq!(byte_code.words().len(), 10);
    }

    #[test]
    fn branches_are_patched() {
        let byte_code = compile_ok("int main() { if (1) return 2; else return 3; }");

        #[rustfmt::skip]
        let expected = vec![
            Op::Ent(0),
            Op::Imm(1), Op::Bz(6),
            Op::Imm(2), Op::Lev, Op::Jmp(8),
            Op::Imm(3), Op::Lev,
            Op::Lev,
        ];

        assert_eq!(byte_code.code, expected);
    }

    #[test]
    fn loops_jump_back_to_the_condition() {
        let byte_code = compile_ok("int main() { while (0) ; return 0; }");

        #[rustfmt::skip]
        let expected = vec![
            Op::Ent(0),
            Op::Imm(0), Op::Bz(4), Op::Jmp(1),
            Op::Imm(0), Op::Lev,
            Op::Lev,
        ];

        assert_eq!(byte_code.code, expected);
    }

    #[test]
    fn frame_offsets() {
        let byte_code = compile_ok(
            "int add(int a, int b) { int c; c = a + b; return c; }
             int main() { return add(1, 2); }",
        );

        #[rustfmt::skip]
        let add = vec![
            Op::Ent(1),
            Op::Lea(-1), Op::Psh, Op::Lea(3), Op::Li, Op::Psh, Op::Lea(2), Op::Li, Op::Add, Op::Si,
            Op::Lea(-1), Op::Li, Op::Lev,
            Op::Lev,
        ];
        #[rustfmt::skip]
        let main = vec![
            Op::Ent(0),
            Op::Imm(1), Op::Psh, Op::Imm(2), Op::Psh, Op::Jsr(0), Op::Adj(2), Op::Lev,
            Op::Lev,
        ];

        assert_eq!(function_code(&byte_code, "add"), add);
        assert_eq!(function_code(&byte_code, "main"), main);
    }

    #[test]
    fn globals_and_strings_share_the_data_segment() {
        let byte_code = compile_ok("char *s; int main() { s = \"ab\"; return 0; }");

        assert_eq!(byte_code.data.len(), 16);
        assert_eq!(&byte_code.data[8..11], b"ab\0");

        #[rustfmt::skip]
        let expected = vec![
            Op::Ent(0),
            Op::Imm(DATA_BASE), Op::Psh, Op::Imm(DATA_BASE + 8), Op::Si,
            Op::Imm(0), Op::Lev,
            Op::Lev,
        ];
        assert_eq!(byte_code.code, expected);
    }

    #[test]
    fn adjacent_strings_are_joined() {
        let byte_code = compile_ok("int main() { printf(\"ab\" \"cd\"); return 0; }");

        assert_eq!(&byte_code.data[..5], b"abcd\0");
        assert_eq!(byte_code.data.len(), 8);
    }

    #[test_case("int *p; int main() { return *(p + 1); }", true ; "int pointers scale by word")]
    #[test_case("int **p; int main() { return **(p + 1); }", true ; "pointer pointers scale by word")]
    #[test_case("char *p; int main() { return *(p + 1); }", false ; "char pointers do not scale")]
    #[test_case("int p; int main() { return p + 1; }", false ; "integers do not scale")]
    fn pointer_arithmetic(source: &str, scaled: bool) {
        let byte_code = compile_ok(source);

        assert_eq!(byte_code.code.contains(&Op::Mul), scaled);
    }

    #[test]
    fn function_addresses_and_indirect_calls() {
        let byte_code = compile_ok(
            "int f() { return 1; }
             int g;
             int main() { int h; g = &f; h = &f; return g() + h(); }",
        );
        let g = byte_code.symbols.lookup("g").unwrap();
        let g = byte_code.symbols.binding(g).val;

        assert!(byte_code.code.contains(&Op::Jsri(g)));
        assert!(byte_code.code.contains(&Op::Jsrs(-1)));
    }

    #[test]
    fn words_decode_back_to_code() {
        let byte_code = compile_ok(
            "int fact(int n) { if (n < 2) return 1; return n * fact(n - 1); }
             int main() { printf(\"%d\\n\", fact(5)); return 0; }",
        );

        assert_eq!(Op::decode(&byte_code.words()), Ok(byte_code.code.clone()));
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = "enum { A = 3 }; int g; int main() { g = A; printf(\"%d\", g); return g; }";
        let first = compile_ok(source);
        let second = compile_ok(source);

        assert_eq!(first.words(), second.words());
        assert_eq!(first.data, second.data);
    }

    #[test_case("int main() { return y; }", Reason::UndefinedVariable("y".to_string()) ; "undefined variable")]
    #[test_case("int main() { return g(); }", Reason::BadFunctionCall("g".to_string()) ; "undefined function")]
    #[test_case("int main() { return f(); } int f() { return 1; }", Reason::BadFunctionCall("f".to_string()) ; "call before definition")]
    #[test_case("int main() { int p; p = &f; return 0; } int f() { return 1; }", Reason::UndefinedVariable("f".to_string()) ; "address before definition")]
    #[test_case("enum { A }; int main() { return A(); }", Reason::BadFunctionCall("A".to_string()) ; "call of constant")]
    #[test_case("int main() { 1 = 2; }", Reason::BadLvalue("assignment") ; "assignment to constant")]
    #[test_case("int main() { 1++; }", Reason::BadLvalue("post-increment") ; "post-increment of constant")]
    #[test_case("int main() { ++1; }", Reason::BadLvalue("pre-increment") ; "pre-increment of constant")]
    #[test_case("int main() { int x; return *x; }", Reason::BadDereference ; "dereference of int")]
    #[test_case("int main() { return &1; }", Reason::BadAddressOf ; "address of constant")]
    #[test_case("int main() { int x; return x[0]; }", Reason::PointerExpected ; "index of int")]
    #[test_case("int main() { return 1 ? 2 3; }", Reason::ColonExpected ; "conditional without colon")]
    #[test_case("int main() { return sizeof int; }", Reason::SizeofOpenParen ; "sizeof without paren")]
    #[test_case("int main() { return (int 1; }", Reason::BadCast ; "unclosed cast")]
    #[test_case("int main() { if 1 return 0; }", Reason::OpenParenExpected ; "if without paren")]
    #[test_case("int f(int a, int a) { return a; }", Reason::DuplicateParameter("a".to_string()) ; "duplicate parameter")]
    #[test_case("int main() { int a; int a; return 0; }", Reason::DuplicateLocal("a".to_string()) ; "duplicate local")]
    #[test_case("int printf;", Reason::DuplicateGlobal("printf".to_string()) ; "global named after a service")]
    #[test_case("enum { 1 };", Reason::BadEnumIdentifier ; "numeric enumerator")]
    #[test_case("enum { A = B };", Reason::BadEnumInitializer ; "symbolic initializer")]
    #[test_case("int 1;", Reason::BadGlobalDeclaration ; "numeric global")]
    #[test_case("int f() int x;", Reason::BadFunctionDefinition ; "function without body")]
    #[test_case("int main() { return 0;", Reason::UnexpectedEof ; "unterminated body")]
    #[test_case("int main() { return \"abc; }", Reason::UnterminatedLiteral ; "unterminated string")]
    #[test_case("int f() { return 0; }", Reason::MainNotDefined ; "no entry point")]
    fn errors(source: &str, expected: Reason) {
        let error = compile(source.as_bytes(), Limits::default()).unwrap_err();

        assert_eq!(error.reason, expected)
    }

    #[test]
    fn errors_report_the_line() {
        let error = compile(b"int main() {\n  int x;\n  x = ;\n}\n", Limits::default()).unwrap_err();

        assert_eq!(error.line, 3);
        assert_eq!(error.to_string(), "3: bad expression (tk: ';')");
    }

    #[test_case(MAX_NESTING - 4, true ; "within bound")]
    #[test_case(MAX_NESTING, false ; "at bound")]
    #[test_case(100_000, false ; "far past bound")]
    fn parenthesis_nesting(depth: usize, accepted: bool) {
        let source = format!(
            "int main() {{ return {}1{}; }}",
            "(".repeat(depth),
            ")".repeat(depth)
        );

        match compile(source.as_bytes(), Limits::default()) {
            Ok(_) => assert!(accepted),
            Err(error) => {
                assert!(!accepted);
                assert_eq!(error.reason, Reason::NestingTooDeep(MAX_NESTING));
            }
        }
    }

    #[test_case("int main() ", "{", "}", "" ; "blocks")]
    #[test_case("int main() { return ", "!", "", "1; }" ; "negations")]
    #[test_case("int main() { ", "if (1) ", "", "; }" ; "conditionals")]
    #[test_case("int main() { ", "while (0) ", "", "; }" ; "loops")]
    fn deep_nesting_is_rejected(head: &str, open: &str, close: &str, tail: &str) {
        let source = format!(
            "{}{}{}{}",
            head,
            open.repeat(100_000),
            tail,
            close.repeat(100_000)
        );

        let error = compile(source.as_bytes(), Limits::default()).unwrap_err();

        assert_eq!(error.reason, Reason::NestingTooDeep(MAX_NESTING));
    }

    #[test_case(
        Limits { code: 4, ..Limits::default() },
        "int main() { return 1 + 2; }",
        Region::Code, 4 ;
        "code"
    )]
    #[test_case(
        Limits { data: 16, ..Limits::default() },
        "int main() { printf(\"a string that does not fit\"); return 0; }",
        Region::Data, 16 ;
        "data string"
    )]
    #[test_case(
        Limits { data: 16, ..Limits::default() },
        "int a, b, c; int main() { return 0; }",
        Region::Data, 16 ;
        "data globals"
    )]
    fn region_capacity_is_enforced(limits: Limits, source: &str, region: Region, capacity: usize) {
        let error = compile(source.as_bytes(), limits).unwrap_err();

        assert_eq!(error.reason, Reason::CapacityExceeded { region, capacity });
    }

    #[test]
    fn symbol_capacity_is_enforced() {
        let builtins = SymbolTable::new(0).len();
        let limits = Limits {
            symbols: builtins,
            ..Limits::default()
        };

        let error = compile(b"int x; int main() { return 0; }", limits).unwrap_err();

        assert_eq!(
            error.reason,
            Reason::CapacityExceeded {
                region: Region::Symbols,
                capacity: builtins
            }
        );
    }

    #[test]
    fn listing_interleaves_lines_and_code() {
        let mut out: Vec<u8> = vec![];

        Compiler::new(b"int main()\n{\n  return 1;\n}\n", Limits::default())
            .with_listing(Box::new(&mut out))
            .compile()
            .unwrap();

        let expected = "1: int main()\n\
                        2: {\n\
                        3:   return 1;\n    ENT  0\n    IMM  1\n    LEV \n\
                        4: }\n    LEV \n";
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }
}
