use crate::compiler::error::{Reason, Region};
use crate::compiler::{Syscall, Type};

use std::collections::HashMap;
use std::fmt;

use itertools::*;

pub type SymbolId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Char,
    Else,
    Enum,
    If,
    Int,
    Return,
    Sizeof,
    While,
}

const KEYWORDS: [(&str, Keyword); 9] = [
    ("char", Keyword::Char),
    ("else", Keyword::Else),
    ("enum", Keyword::Enum),
    ("if", Keyword::If),
    ("int", Keyword::Int),
    ("return", Keyword::Return),
    ("sizeof", Keyword::Sizeof),
    ("while", Keyword::While),
    ("void", Keyword::Char),
];

pub const ENTRY: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Keyword(Keyword),
    Num,
    Fun,
    Sys(Syscall),
    Glo,
    Loc,
    Unbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub class: Class,
    pub ty: Type,
    pub val: i64,
}

impl Binding {
    pub fn new(class: Class, ty: Type, val: i64) -> Binding {
        Binding { class, ty, val }
    }

    pub fn unbound() -> Binding {
        Binding::new(Class::Unbound, Type::CHAR, 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub binding: Binding,
}

/*
   Every identifier ever seen gets exactly one record, in order of first
   appearance. The record holds the file-level binding; parameters and
   locals live in the innermost scope and hide that binding until the
   scope is left again.
*/
#[derive(Debug, Clone)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<String, SymbolId>,
    scopes: Vec<HashMap<SymbolId, Binding>>,
    entry: SymbolId,
    capacity: usize,
}

impl SymbolTable {
    pub fn new(capacity: usize) -> SymbolTable {
        let mut table = SymbolTable {
            symbols: vec![],
            index: HashMap::new(),
            scopes: vec![],
            entry: 0,
            capacity,
        };

        for (name, keyword) in KEYWORDS.iter() {
            table.bind_builtin(name, Binding::new(Class::Keyword(*keyword), Type::CHAR, 0));
        }
        for call in Syscall::ALL.iter() {
            let binding = Binding::new(Class::Sys(*call), Type::INT, call.ordinal());
            table.bind_builtin(call.name(), binding);
        }
        table.entry = table.bind_builtin(ENTRY, Binding::unbound());

        table
    }

    fn bind_builtin(&mut self, name: &str, binding: Binding) -> SymbolId {
        let id = self.symbols.len();
        self.symbols.push(Symbol {
            name: name.to_string(),
            binding,
        });
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn intern(&mut self, name: &str) -> std::result::Result<SymbolId, Reason> {
        if let Some(id) = self.index.get(name) {
            return Ok(*id);
        }

        if self.symbols.len() >= self.capacity {
            return Err(Reason::CapacityExceeded {
                region: Region::Symbols,
                capacity: self.capacity,
            });
        }

        Ok(self.bind_builtin(name, Binding::unbound()))
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id]
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.symbols[id].name
    }

    /// The designated program entry, `main`.
    pub fn entry(&self) -> SymbolId {
        self.entry
    }

    /// Keywords and host services precede the entry symbol and can never be
    /// rebound by declarations.
    pub fn is_builtin(&self, id: SymbolId) -> bool {
        id < self.entry
    }

    pub fn binding(&self, id: SymbolId) -> Binding {
        self.scopes
            .last()
            .and_then(|scope| scope.get(&id))
            .copied()
            .unwrap_or(self.symbols[id].binding)
    }

    /// Sets the file-level binding, refusing to touch builtins.
    pub fn define(&mut self, id: SymbolId, binding: Binding) -> bool {
        if self.is_builtin(id) {
            false
        } else {
            self.symbols[id].binding = binding;
            true
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    /// Binds a parameter or local in the innermost scope. Fails if the name
    /// is already declared there.
    pub fn declare_local(&mut self, id: SymbolId, ty: Type, val: i64) -> bool {
        match self.scopes.last_mut() {
            Some(scope) if !scope.contains_key(&id) => {
                scope.insert(id, Binding::new(Class::Loc, ty, val));
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols.iter().enumerate()
    }

    /// Linear scan for the function whose code starts at `address`.
    pub fn function_at(&self, address: usize) -> Option<SymbolId> {
        self.iter()
            .find(|(_, symbol)| {
                symbol.binding.class == Class::Fun && symbol.binding.val == address as i64
            })
            .map(|(id, _)| id)
    }
}

impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.symbols
                .iter()
                .map(|symbol| format!("{} -> {:?}", symbol.name, symbol.binding.class))
                .join(", ")
        )
    }
}
