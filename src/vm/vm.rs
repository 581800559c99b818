use crate::compiler::{Address, ByteCode, Op, SymbolId, SymbolTable, Syscall};
use crate::config::Limits;
use crate::diagnostics::{stack_trace, trace_line};
use crate::vm::error::{Result, RuntimeError};
use crate::vm::host::Host;
use crate::vm::memory::{Memory, WORD};
use crate::vm::printf;

use std::io::Write;

use itertools::*;
use tracing::{debug, info, warn};

// Arguments printf can consume after the format string.
const PRINTF_ARGS: i64 = 6;

/*
   Registers:
   (1) `a` is the accumulator holding the result of the last expression.
   (2) `sp` points at the top of the stack, which grows downwards.
   (3) `bp` points at the saved frame pointer of the running function; the
     return address sits one word above it, arguments above that.
   (4) `pc` is the index of the next instruction.
*/
pub struct VirtualMachine<W: Write> {
    code: Vec<Op>,
    symbols: SymbolTable,
    entry: SymbolId,
    memory: Memory,
    host: Host,
    out: W,
    trace: bool,
    a: i64,
    sp: i64,
    bp: i64,
    pc: Address,
    cycle: u64,
}

impl<W: Write> VirtualMachine<W> {
    pub fn new(byte_code: ByteCode, limits: &Limits, out: W) -> VirtualMachine<W> {
        let memory = Memory::new(&byte_code.data, limits);
        let top = memory.stack_top();

        VirtualMachine {
            code: byte_code.code,
            symbols: byte_code.symbols,
            entry: byte_code.entry,
            memory,
            host: Host::new(),
            out,
            trace: false,
            a: 0,
            sp: top,
            bp: top,
            pc: 0,
            cycle: 0,
        }
    }

    /// Print each instruction before it executes.
    pub fn with_trace(mut self, trace: bool) -> VirtualMachine<W> {
        self.trace = trace;
        self
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    fn push(&mut self, value: i64) -> Result<()> {
        self.sp -= WORD;
        if self.sp < self.memory.stack_base() {
            return Err(RuntimeError::StackOverflow {
                capacity: self.memory.stack_size(),
            });
        }
        self.memory.store_word(self.sp, value)
    }

    fn pop(&mut self) -> Result<i64> {
        let value = self.memory.load_word(self.sp)?;
        self.sp += WORD;
        Ok(value)
    }

    // The nth word above the stack top; call arguments are read in reverse.
    fn stack_arg(&self, n: i64) -> Result<i64> {
        self.memory.load_word(self.sp + n * WORD)
    }

    // Copies the program arguments onto the heap as a NULL-terminated
    // vector of C strings.
    fn place_arguments(&mut self, args: &[String]) -> Result<i64> {
        let mut pointers = Vec::with_capacity(args.len() + 1);

        for arg in args {
            let bytes = arg.as_bytes();
            let address = self.allocate(bytes.len() + 1)?;
            self.memory
                .bytes_mut(address, bytes.len())?
                .copy_from_slice(bytes);
            pointers.push(address);
        }
        pointers.push(0);

        let argv = self.allocate(pointers.len() * WORD as usize)?;
        for (i, pointer) in pointers.into_iter().enumerate() {
            self.memory.store_word(argv + i as i64 * WORD, pointer)?;
        }

        Ok(argv)
    }

    fn allocate(&mut self, requested: usize) -> Result<i64> {
        match self.memory.malloc(requested as i64) {
            0 => Err(RuntimeError::OutOfMemory { requested }),
            address => Ok(address),
        }
    }

    /// Runs the entry function with `args` as its `argv` and yields the exit
    /// status.
    pub fn run(&mut self, args: &[String]) -> Result<i64> {
        debug!(args = %args.iter().join(" "), "starting");

        // Returning from the entry function lands on `exit(a)`.
        let trailer = self.code.len();
        self.code.push(Op::Psh);
        self.code.push(Op::Sys(Syscall::Exit));

        let argv = self.place_arguments(args)?;
        self.sp = self.memory.stack_top();
        self.bp = self.sp;
        self.push(args.len() as i64)?;
        self.push(argv)?;
        self.push(trailer as i64)?;

        self.pc = self.symbols.binding(self.entry).val as Address;
        self.a = 0;
        self.cycle = 0;

        loop {
            let op = match self.code.get(self.pc) {
                Some(op) => *op,
                None => {
                    return Err(RuntimeError::UnknownInstruction {
                        pc: self.pc,
                        cycle: self.cycle,
                    })
                }
            };
            self.pc += 1;
            self.cycle += 1;

            if self.trace {
                writeln!(self.out, "{}", trace_line(self.cycle, &op))?;
            }

            match op {
                Op::Lea(n) => self.a = self.bp.wrapping_add(n.wrapping_mul(WORD)),
                Op::Imm(n) => self.a = n,
                Op::Jmp(target) => self.pc = target,
                Op::Jsr(target) => {
                    self.push(self.pc as i64)?;
                    self.pc = target;
                }
                Op::Jsri(cell) => {
                    let target = self.memory.load_word(cell)?;
                    self.push(self.pc as i64)?;
                    self.pc = target as Address;
                }
                Op::Jsrs(n) => {
                    let target = self.memory.load_word(self.bp + n * WORD)?;
                    self.push(self.pc as i64)?;
                    self.pc = target as Address;
                }
                Op::Bz(target) => {
                    if self.a == 0 {
                        self.pc = target
                    }
                }
                Op::Bnz(target) => {
                    if self.a != 0 {
                        self.pc = target
                    }
                }
                Op::Ent(n) => {
                    self.push(self.bp)?;
                    self.bp = self.sp;
                    self.sp -= n * WORD;
                    if self.sp < self.memory.stack_base() {
                        return Err(RuntimeError::StackOverflow {
                            capacity: self.memory.stack_size(),
                        });
                    }
                }
                Op::Adj(n) => self.sp += n * WORD,
                Op::Lev => {
                    self.sp = self.bp;
                    self.bp = self.pop()?;
                    self.pc = self.pop()? as Address;
                }
                Op::Li => self.a = self.memory.load_word(self.a)?,
                Op::Lc => self.a = self.memory.load_byte(self.a)?,
                Op::Si => {
                    let address = self.pop()?;
                    self.memory.store_word(address, self.a)?;
                }
                Op::Sc => {
                    let address = self.pop()?;
                    self.memory.store_byte(address, self.a)?;
                    self.a = self.a as i8 as i64;
                }
                Op::Psh => self.push(self.a)?,
                Op::Sys(call) => {
                    if let Some(status) = self.syscall(call)? {
                        return Ok(status);
                    }
                }
                op => {
                    let left = self.pop()?;
                    self.a = self.binary(op, left, self.a)?;
                }
            }
        }
    }

    fn binary(&self, op: Op, left: i64, right: i64) -> Result<i64> {
        if right == 0 && (op == Op::Div || op == Op::Mod) {
            return Err(RuntimeError::DivisionByZero { pc: self.pc - 1 });
        }

        #[rustfmt::skip]
        let value = match op {
            Op::Or  => left | right,
            Op::Xor => left ^ right,
            Op::And => left & right,
            Op::Eq  => (left == right) as i64,
            Op::Ne  => (left != right) as i64,
            Op::Lt  => (left < right) as i64,
            Op::Gt  => (left > right) as i64,
            Op::Le  => (left <= right) as i64,
            Op::Ge  => (left >= right) as i64,
            Op::Shl => left.wrapping_shl(right as u32),
            Op::Shr => left.wrapping_shr(right as u32),
            Op::Add => left.wrapping_add(right),
            Op::Sub => left.wrapping_sub(right),
            Op::Mul => left.wrapping_mul(right),
            Op::Div => left.wrapping_div(right),
            Op::Mod => left.wrapping_rem(right),
            _ => {
                return Err(RuntimeError::UnknownInstruction {
                    pc: self.pc - 1,
                    cycle: self.cycle,
                })
            }
        };

        Ok(value)
    }

    // Services take their arguments from the stack, last argument on top.
    // Yields the exit status once the program asks to terminate.
    fn syscall(&mut self, call: Syscall) -> Result<Option<i64>> {
        match call {
            Syscall::Open => {
                let path = self.memory.read_cstr(self.stack_arg(1)?)?.to_vec();
                self.a = self.host.open(&path, self.stack_arg(0)?);
            }
            Syscall::Read => {
                let (fd, buf, len) = (self.stack_arg(2)?, self.stack_arg(1)?, self.stack_arg(0)?);
                self.a = if len < 0 {
                    -1
                } else {
                    let buf = self.memory.bytes_mut(buf, len as usize)?;
                    self.host.read(fd, buf)
                };
            }
            Syscall::Close => self.a = self.host.close(self.stack_arg(0)?),
            Syscall::Printf => self.printf()?,
            Syscall::Malloc => self.a = self.memory.malloc(self.stack_arg(0)?),
            Syscall::Realloc => {
                let (address, size) = (self.stack_arg(1)?, self.stack_arg(0)?);
                self.a = self.memory.realloc(address, size);
            }
            Syscall::Free => {
                let address = self.stack_arg(0)?;
                if !self.memory.free(address) {
                    warn!(address, cycle = self.cycle, "free of unallocated block");
                }
            }
            Syscall::Memset => {
                let (dest, value, len) = (self.stack_arg(2)?, self.stack_arg(1)?, self.stack_arg(0)?);
                self.memory.fill(dest, value as u8, len)?;
                self.a = dest;
            }
            Syscall::Memcmp => {
                let (left, right, len) = (self.stack_arg(2)?, self.stack_arg(1)?, self.stack_arg(0)?);
                self.a = self.memory.compare(left, right, len)?;
            }
            Syscall::Memcpy => {
                let (dest, src, len) = (self.stack_arg(2)?, self.stack_arg(1)?, self.stack_arg(0)?);
                self.memory.copy(dest, src, len)?;
                self.a = dest;
            }
            Syscall::Stacktrace => {
                stack_trace(
                    &mut self.out,
                    &self.symbols,
                    self.entry,
                    &self.memory,
                    self.pc,
                    self.bp,
                )?;
            }
            Syscall::Exit => {
                let status = self.stack_arg(0)?;
                self.out.flush()?;
                info!(status, cycles = self.cycle, "exit");
                return Ok(Some(status));
            }
        }

        Ok(None)
    }

    // The argument count is taken from the `ADJ` that follows the call.
    fn printf(&mut self) -> Result<()> {
        let count = match self.code.get(self.pc) {
            Some(Op::Adj(n)) => *n,
            _ => 0,
        };
        if count == 0 {
            self.a = 0;
            return Ok(());
        }

        let fmt = self.stack_arg(count - 1)?;
        let args = (1..count.min(PRINTF_ARGS + 1))
            .map(|k| self.stack_arg(count - 1 - k))
            .collect::<Result<Vec<_>>>()?;

        let text = printf::format(self.memory.read_cstr(fmt)?, &args, &self.memory)?;
        self.out.write_all(&text)?;
        self.a = text.len() as i64;
        Ok(())
    }
}
