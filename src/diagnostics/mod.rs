mod disasm;
mod stacktrace;
mod symbols;

pub use disasm::{listing, listing_line, trace_line};
pub use stacktrace::stack_trace;
pub use symbols::{describe, dump_symbols};
