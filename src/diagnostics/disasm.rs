use crate::compiler::Op;

use itertools::*;

/// One listing row: the mnemonic right-aligned in eight columns, then the
/// operand if the instruction carries one.
pub fn listing_line(op: &Op) -> String {
    let mnemonic = format!("{:>8}", format!("{:<4}", op.mnemonic()));

    match op.operand() {
        Some(operand) => format!("{} {}", mnemonic, operand),
        None => mnemonic,
    }
}

pub fn listing(ops: &[Op]) -> String {
    ops.iter()
        .map(|op| format!("{}\n", listing_line(op)))
        .join("")
}

/// Row printed before an instruction executes in trace mode.
pub fn trace_line(cycle: u64, op: &Op) -> String {
    format!("{}> {}", cycle, op)
}
