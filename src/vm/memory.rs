use std::collections::BTreeMap;
use std::convert::TryFrom;

use crate::config::Limits;
use crate::vm::error::{Result, RuntimeError};

pub const WORD: i64 = 8;

/// Lowest valid address. Keeps small integers, null in particular, from
/// being mistaken for pointers.
pub const DATA_BASE: i64 = 0x10000;

fn align(size: usize) -> usize {
    let word = WORD as usize;
    (size + word - 1) / word * word
}

/// One flat address space: the data segment, then the stack growing down
/// from `stack_top` towards `stack_base`, then a heap that grows on demand.
#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    stack_base: i64,
    stack_top: i64,
    heap_limit: usize,
    // Live heap blocks by address, with their rounded size.
    blocks: BTreeMap<i64, usize>,
    free: Vec<(i64, usize)>,
}

impl Memory {
    pub fn new(data: &[u8], limits: &Limits) -> Memory {
        let data_size = align(limits.data.max(data.len()));
        let stack_size = align(limits.stack);

        let mut bytes = vec![0; data_size + stack_size];
        bytes[..data.len()].copy_from_slice(data);

        let stack_base = DATA_BASE + data_size as i64;

        Memory {
            bytes,
            stack_base,
            stack_top: stack_base + stack_size as i64,
            heap_limit: limits.heap,
            blocks: BTreeMap::new(),
            free: vec![],
        }
    }

    pub fn stack_base(&self) -> i64 {
        self.stack_base
    }

    pub fn stack_top(&self) -> i64 {
        self.stack_top
    }

    pub fn stack_size(&self) -> usize {
        (self.stack_top - self.stack_base) as usize
    }

    fn offset(&self, address: i64, len: usize) -> Result<usize> {
        let fault = RuntimeError::Segfault { address, len };

        let start = address
            .checked_sub(DATA_BASE)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(|| fault.clone())?;

        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start),
            _ => Err(fault),
        }
    }

    pub fn bytes(&self, address: i64, len: usize) -> Result<&[u8]> {
        let start = self.offset(address, len)?;
        Ok(&self.bytes[start..start + len])
    }

    pub fn bytes_mut(&mut self, address: i64, len: usize) -> Result<&mut [u8]> {
        let start = self.offset(address, len)?;
        Ok(&mut self.bytes[start..start + len])
    }

    pub fn load_word(&self, address: i64) -> Result<i64> {
        let mut word = [0; WORD as usize];
        word.copy_from_slice(self.bytes(address, WORD as usize)?);
        Ok(i64::from_le_bytes(word))
    }

    pub fn store_word(&mut self, address: i64, value: i64) -> Result<()> {
        self.bytes_mut(address, WORD as usize)?
            .copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Chars are signed, as on the usual C targets.
    pub fn load_byte(&self, address: i64) -> Result<i64> {
        Ok(self.bytes(address, 1)?[0] as i8 as i64)
    }

    pub fn store_byte(&mut self, address: i64, value: i64) -> Result<()> {
        self.bytes_mut(address, 1)?[0] = value as u8;
        Ok(())
    }

    /// Bytes from `address` up to, not including, the next NUL.
    pub fn read_cstr(&self, address: i64) -> Result<&[u8]> {
        let start = self.offset(address, 0)?;

        match self.bytes[start..].iter().position(|&b| b == 0) {
            Some(len) => Ok(&self.bytes[start..start + len]),
            None => Err(RuntimeError::Segfault {
                address,
                len: self.bytes.len() - start + 1,
            }),
        }
    }

    pub fn fill(&mut self, address: i64, value: u8, len: i64) -> Result<()> {
        let len = span(address, len)?;
        self.bytes_mut(address, len)?
            .iter_mut()
            .for_each(|b| *b = value);
        Ok(())
    }

    /// Byte-wise comparison, yielding the difference of the first unequal
    /// pair.
    pub fn compare(&self, left: i64, right: i64, len: i64) -> Result<i64> {
        let len = span(left, len)?;
        let left = self.bytes(left, len)?;
        let right = self.bytes(right, len)?;

        Ok(left
            .iter()
            .zip(right)
            .find(|(l, r)| l != r)
            .map_or(0, |(&l, &r)| l as i64 - r as i64))
    }

    pub fn copy(&mut self, dest: i64, src: i64, len: i64) -> Result<()> {
        let len = span(dest, len)?;
        let from = self.offset(src, len)?;
        let to = self.offset(dest, len)?;
        self.bytes.copy_within(from..from + len, to);
        Ok(())
    }

    fn heap_used(&self) -> usize {
        self.bytes.len() - (self.stack_top - DATA_BASE) as usize
    }

    /// First fit over freed blocks, then bump allocation. Yields 0 for
    /// non-positive sizes or once the heap limit is reached.
    pub fn malloc(&mut self, size: i64) -> i64 {
        let size = match usize::try_from(size) {
            Ok(size) if size > 0 => align(size),
            _ => return 0,
        };

        let address = match self.free.iter().position(|&(_, len)| len >= size) {
            Some(index) => {
                let (address, len) = self.free.remove(index);
                self.blocks.insert(address, len);
                address
            }
            None => {
                if self.heap_used().saturating_add(size) > self.heap_limit {
                    return 0;
                }
                let address = DATA_BASE + self.bytes.len() as i64;
                self.bytes.resize(self.bytes.len() + size, 0);
                self.blocks.insert(address, size);
                address
            }
        };

        let len = self.blocks[&address];
        let start = (address - DATA_BASE) as usize;
        self.bytes[start..start + len].iter_mut().for_each(|b| *b = 0);
        address
    }

    /// Returns false when `address` is not a live block.
    pub fn free(&mut self, address: i64) -> bool {
        if address == 0 {
            return true;
        }

        match self.blocks.remove(&address) {
            Some(len) => {
                self.free.push((address, len));
                true
            }
            None => false,
        }
    }

    /// Grows or shrinks a block. Shrinking stays in place; growing moves
    /// the contents to a fresh block. A failed move leaves the old block
    /// intact and yields 0.
    pub fn realloc(&mut self, address: i64, size: i64) -> i64 {
        if address == 0 {
            return self.malloc(size);
        }
        if size <= 0 {
            self.free(address);
            return 0;
        }

        let old = match self.blocks.get(&address) {
            Some(&len) => len,
            None => return 0,
        };
        if align(size as usize) <= old {
            return address;
        }

        let moved = self.malloc(size);
        if moved != 0 {
            let from = (address - DATA_BASE) as usize;
            let to = (moved - DATA_BASE) as usize;
            self.bytes.copy_within(from..from + old, to);
            self.free(address);
        }
        moved
    }
}

fn span(address: i64, len: i64) -> Result<usize> {
    usize::try_from(len).map_err(|_| RuntimeError::Segfault { address, len: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Memory {
        let limits = Limits {
            data: 64,
            stack: 64,
            heap: 256,
            ..Limits::default()
        };
        Memory::new(b"hello\0", &limits)
    }

    #[test]
    fn layout() {
        let memory = memory();

        assert_eq!(memory.stack_base(), DATA_BASE + 64);
        assert_eq!(memory.stack_top(), DATA_BASE + 128);
        assert_eq!(memory.read_cstr(DATA_BASE), Ok(&b"hello"[..]));
    }

    #[test]
    fn words_are_little_endian() {
        let mut memory = memory();

        memory.store_word(DATA_BASE + 8, 0x0102).unwrap();

        assert_eq!(memory.load_word(DATA_BASE + 8), Ok(0x0102));
        assert_eq!(memory.load_byte(DATA_BASE + 8), Ok(2));
        assert_eq!(memory.load_byte(DATA_BASE + 9), Ok(1));
    }

    #[test]
    fn bytes_are_signed() {
        let mut memory = memory();

        memory.store_byte(DATA_BASE, 0xff).unwrap();

        assert_eq!(memory.load_byte(DATA_BASE), Ok(-1));
    }

    #[test]
    fn out_of_bounds_access_faults() {
        let memory = memory();

        assert_eq!(
            memory.load_word(0),
            Err(RuntimeError::Segfault { address: 0, len: 8 })
        );
        assert!(memory.load_word(DATA_BASE + 124).is_err());
    }

    #[test]
    fn malloc_reuses_freed_blocks() {
        let mut memory = memory();

        let a = memory.malloc(10);
        let b = memory.malloc(8);
        assert_eq!(b, a + 16);

        assert!(memory.free(a));
        assert!(!memory.free(a));
        assert_eq!(memory.malloc(16), a);
    }

    #[test]
    fn malloc_respects_heap_limit() {
        let mut memory = memory();

        assert_eq!(memory.malloc(0), 0);
        assert_eq!(memory.malloc(-1), 0);
        assert_ne!(memory.malloc(256), 0);
        assert_eq!(memory.malloc(1), 0);
    }

    #[test]
    fn realloc_preserves_contents() {
        let mut memory = memory();

        let a = memory.malloc(8);
        memory.store_word(a, 42).unwrap();
        assert_eq!(memory.realloc(a, 4), a);

        let b = memory.realloc(a, 32);
        assert_ne!(b, a);
        assert_eq!(memory.load_word(b), Ok(42));
        assert!(!memory.free(a));
    }

    #[test]
    fn block_operations() {
        let mut memory = memory();

        let a = memory.malloc(8);
        let b = memory.malloc(8);
        memory.fill(a, b'x', 4).unwrap();
        memory.copy(b, a, 8).unwrap();

        assert_eq!(memory.compare(a, b, 8), Ok(0));
        memory.store_byte(b + 2, b'y' as i64).unwrap();
        assert_eq!(memory.compare(a, b, 8), Ok(-1));
        assert_eq!(memory.read_cstr(b), Ok(&b"xxyx"[..]));
    }
}
