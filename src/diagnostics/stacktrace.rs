use std::io::Write;

use crate::compiler::{Address, SymbolId, SymbolTable};
use crate::diagnostics::describe;
use crate::vm::{Memory, RuntimeError, WORD};

/// Walks the frame chain from the current frame outwards, printing the
/// function each frame belongs to. `pc` points just past the instruction
/// being executed and `bp` is the current frame pointer. The walk ends at
/// the entry function.
pub fn stack_trace<W: Write>(
    out: &mut W,
    symbols: &SymbolTable,
    entry: SymbolId,
    memory: &Memory,
    pc: Address,
    bp: i64,
) -> Result<(), RuntimeError> {
    let mut pc = match pc.checked_sub(1) {
        Some(pc) => pc,
        None => return Ok(()),
    };
    let mut bp = bp;
    let mut depth = 0;

    loop {
        let function = match locate(symbols, pc) {
            Some(function) => function,
            None => return Ok(()),
        };

        writeln!(out, "{:depth$}{}", "", describe(symbols, function), depth = depth)?;

        if function == entry {
            return Ok(());
        }

        let return_address = memory.load_word(bp + WORD)?;
        bp = memory.load_word(bp)?;
        pc = match (return_address as Address).checked_sub(1) {
            Some(pc) if return_address > 0 => pc,
            _ => return Ok(()),
        };
        depth += 1;
    }
}

// The function whose body contains `pc`: the nearest entry point at or
// before it.
fn locate(symbols: &SymbolTable, pc: Address) -> Option<SymbolId> {
    (0..=pc).rev().find_map(|address| symbols.function_at(address))
}
