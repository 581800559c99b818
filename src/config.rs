use crate::vm::WORD;

pub const DEFAULT_POOL_SIZE: usize = 256 * 1024;

// Bytes per symbol record: nine machine words.
const SYMBOL_RECORD_SIZE: usize = 9 * WORD as usize;

const HEAP_FACTOR: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Echo each source line followed by the code emitted for it; skips
    /// execution.
    pub source: bool,
    /// Print every instruction before it executes.
    pub debug: bool,
    /// Dump the symbol table after compilation.
    pub symbols: bool,
    pub pool_size: usize,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            source: false,
            debug: false,
            symbols: false,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl Options {
    pub fn limits(&self) -> Limits {
        Limits::from_pool_size(self.pool_size)
    }
}

/// Capacities of the fixed regions. Symbols and code are counted in records
/// and machine words, everything else in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub symbols: usize,
    pub code: usize,
    pub data: usize,
    pub stack: usize,
    pub source: usize,
    pub heap: usize,
}

impl Limits {
    pub fn from_pool_size(pool_size: usize) -> Limits {
        Limits {
            symbols: pool_size / SYMBOL_RECORD_SIZE,
            code: pool_size / WORD as usize,
            data: pool_size,
            stack: pool_size,
            source: pool_size.saturating_sub(1),
            heap: pool_size.saturating_mul(HEAP_FACTOR),
        }
    }
}

impl Default for Limits {
    fn default() -> Limits {
        Limits::from_pool_size(DEFAULT_POOL_SIZE)
    }
}

/// Applies `-p`/`-P`: each halving or doubling step scales the pool once.
pub fn scale_pool_size(base: usize, halvings: u8, doublings: u8) -> usize {
    let halved = (0..halvings).fold(base, |size, _| size / 2);
    (0..doublings).fold(halved, |size, _| size.saturating_mul(2))
}
