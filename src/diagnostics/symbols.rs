use crate::compiler::{Class, SymbolId, SymbolTable};

use std::io::{self, Write};

/// Renders a record according to its class: functions as a signature with
/// their entry address, variables with their storage value, constants with
/// their value.
pub fn describe(symbols: &SymbolTable, id: SymbolId) -> String {
    let symbol = symbols.symbol(id);
    let binding = symbol.binding;
    let name = &symbol.name;

    match binding.class {
        Class::Fun => format!("{} {}() [{:#x}]", binding.ty, name, binding.val),
        Class::Keyword(_) => format!("builtin: {}", name),
        Class::Sys(_) => format!("opcode: {} = {}", name, binding.val),
        Class::Glo | Class::Loc => {
            format!("{} {} @ {} ({:#X})", binding.ty, name, binding.val, binding.val)
        }
        Class::Unbound => format!(
            "{} {} @ {} ({:#X}) (temporary)",
            binding.ty, name, binding.val, binding.val
        ),
        Class::Num => format!("enum {} = {} / {:#X}", name, binding.val, binding.val),
    }
}

pub fn dump_symbols<W: Write>(out: &mut W, symbols: &SymbolTable) -> io::Result<()> {
    for (id, _) in symbols.iter() {
        writeln!(out, "{}", describe(symbols, id))?;
    }

    writeln!(out, "Symbol table: {} entries", symbols.len())
}
