use std::fmt;

use thiserror::Error;

/// Index into the instruction vector.
pub type Address = usize;

/// Host services reachable from compiled programs. The discriminant order is
/// the stable ordinal exposed to programs (offset by `Op::SYSCALL_BASE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Syscall {
    Open,
    Read,
    Close,
    Printf,
    Malloc,
    Realloc,
    Free,
    Memset,
    Memcmp,
    Memcpy,
    Stacktrace,
    Exit,
}

impl Syscall {
    pub const ALL: [Syscall; 12] = [
        Syscall::Open,
        Syscall::Read,
        Syscall::Close,
        Syscall::Printf,
        Syscall::Malloc,
        Syscall::Realloc,
        Syscall::Free,
        Syscall::Memset,
        Syscall::Memcmp,
        Syscall::Memcpy,
        Syscall::Stacktrace,
        Syscall::Exit,
    ];

    /// Name under which the service is bound in the symbol table.
    pub fn name(self) -> &'static str {
        #[rustfmt::skip]
        let name = match self {
            Syscall::Open       => "open",
            Syscall::Read       => "read",
            Syscall::Close      => "close",
            Syscall::Printf     => "printf",
            Syscall::Malloc     => "malloc",
            Syscall::Realloc    => "realloc",
            Syscall::Free       => "free",
            Syscall::Memset     => "memset",
            Syscall::Memcmp     => "memcmp",
            Syscall::Memcpy     => "memcpy",
            Syscall::Stacktrace => "stacktrace",
            Syscall::Exit       => "exit",
        };

        name
    }

    pub fn mnemonic(self) -> &'static str {
        #[rustfmt::skip]
        let mnemonic = match self {
            Syscall::Open       => "OPEN",
            Syscall::Read       => "READ",
            Syscall::Close      => "CLOS",
            Syscall::Printf     => "PRTF",
            Syscall::Malloc     => "MALC",
            Syscall::Realloc    => "RALC",
            Syscall::Free       => "FREE",
            Syscall::Memset     => "MSET",
            Syscall::Memcmp     => "MCMP",
            Syscall::Memcpy     => "MCPY",
            Syscall::Stacktrace => "STRC",
            Syscall::Exit       => "EXIT",
        };

        mnemonic
    }

    pub fn ordinal(self) -> i64 {
        Op::SYSCALL_BASE + self as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // Loads and control flow, each carrying one operand word
    Lea(i64),
    Imm(i64),
    Jmp(Address),
    Jsr(Address),
    Jsri(i64),
    Jsrs(i64),
    Bz(Address),
    Bnz(Address),
    Ent(i64),
    Adj(i64),

    // Frame and memory
    Lev,
    Li,
    Lc,
    Si,
    Sc,
    Psh,

    // Binary operations: left operand on the stack, right in the accumulator
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Host services
    Sys(Syscall),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown instruction = {opcode} at word {position}")]
    UnknownOpcode { opcode: i64, position: usize },
    #[error("missing operand for {mnemonic} at word {position}")]
    MissingOperand {
        mnemonic: &'static str,
        position: usize,
    },
}

impl Op {
    pub const SYSCALL_BASE: i64 = 32;

    pub fn opcode(&self) -> i64 {
        #[rustfmt::skip]
        let opcode = match self {
            Op::Lea(_)  => 0,
            Op::Imm(_)  => 1,
            Op::Jmp(_)  => 2,
            Op::Jsr(_)  => 3,
            Op::Jsri(_) => 4,
            Op::Jsrs(_) => 5,
            Op::Bz(_)   => 6,
            Op::Bnz(_)  => 7,
            Op::Ent(_)  => 8,
            Op::Adj(_)  => 9,
            Op::Lev     => 10,
            Op::Li      => 11,
            Op::Lc      => 12,
            Op::Si      => 13,
            Op::Sc      => 14,
            Op::Psh     => 15,
            Op::Or      => 16,
            Op::Xor     => 17,
            Op::And     => 18,
            Op::Eq      => 19,
            Op::Ne      => 20,
            Op::Lt      => 21,
            Op::Gt      => 22,
            Op::Le      => 23,
            Op::Ge      => 24,
            Op::Shl     => 25,
            Op::Shr     => 26,
            Op::Add     => 27,
            Op::Sub     => 28,
            Op::Mul     => 29,
            Op::Div     => 30,
            Op::Mod     => 31,
            Op::Sys(call) => call.ordinal(),
        };

        opcode
    }

    pub fn mnemonic(&self) -> &'static str {
        #[rustfmt::skip]
        let mnemonic = match self {
            Op::Lea(_)  => "LEA",
            Op::Imm(_)  => "IMM",
            Op::Jmp(_)  => "JMP",
            Op::Jsr(_)  => "JSR",
            Op::Jsri(_) => "JSRI",
            Op::Jsrs(_) => "JSRS",
            Op::Bz(_)   => "BZ",
            Op::Bnz(_)  => "BNZ",
            Op::Ent(_)  => "ENT",
            Op::Adj(_)  => "ADJ",
            Op::Lev     => "LEV",
            Op::Li      => "LI",
            Op::Lc      => "LC",
            Op::Si      => "SI",
            Op::Sc      => "SC",
            Op::Psh     => "PSH",
            Op::Or      => "OR",
            Op::Xor     => "XOR",
            Op::And     => "AND",
            Op::Eq      => "EQ",
            Op::Ne      => "NE",
            Op::Lt      => "LT",
            Op::Gt      => "GT",
            Op::Le      => "LE",
            Op::Ge      => "GE",
            Op::Shl     => "SHL",
            Op::Shr     => "SHR",
            Op::Add     => "ADD",
            Op::Sub     => "SUB",
            Op::Mul     => "MUL",
            Op::Div     => "DIV",
            Op::Mod     => "MOD",
            Op::Sys(call) => call.mnemonic(),
        };

        mnemonic
    }

    pub fn operand(&self) -> Option<i64> {
        match *self {
            Op::Lea(n) | Op::Imm(n) | Op::Jsri(n) | Op::Jsrs(n) | Op::Ent(n) | Op::Adj(n) => {
                Some(n)
            }
            Op::Jmp(address) | Op::Jsr(address) | Op::Bz(address) | Op::Bnz(address) => {
                Some(address as i64)
            }
            _ => None,
        }
    }

    /// Number of machine words the instruction occupies.
    pub fn width(&self) -> usize {
        if self.operand().is_some() {
            2
        } else {
            1
        }
    }

    pub fn encode(&self, words: &mut Vec<i64>) {
        words.push(self.opcode());
        if let Some(operand) = self.operand() {
            words.push(operand);
        }
    }

    pub fn decode(words: &[i64]) -> Result<Vec<Op>, DecodeError> {
        let mut ops = vec![];
        let mut position = 0;

        while position < words.len() {
            let opcode = words[position];
            let operand = words.get(position + 1).copied();

            let op = match opcode {
                0..=9 => {
                    let n = operand.ok_or(DecodeError::MissingOperand {
                        mnemonic: Op::with_operand(opcode, 0).mnemonic(),
                        position,
                    })?;
                    position += 1;
                    Op::with_operand(opcode, n)
                }
                10..=31 => Op::without_operand(opcode),
                _ => {
                    let call = Syscall::ALL
                        .iter()
                        .find(|call| call.ordinal() == opcode)
                        .ok_or(DecodeError::UnknownOpcode { opcode, position })?;
                    Op::Sys(*call)
                }
            };

            ops.push(op);
            position += 1;
        }

        Ok(ops)
    }

    fn with_operand(opcode: i64, n: i64) -> Op {
        #[rustfmt::skip]
        let op = match opcode {
            0 => Op::Lea(n),
            1 => Op::Imm(n),
            2 => Op::Jmp(n as Address),
            3 => Op::Jsr(n as Address),
            4 => Op::Jsri(n),
            5 => Op::Jsrs(n),
            6 => Op::Bz(n as Address),
            7 => Op::Bnz(n as Address),
            8 => Op::Ent(n),
            _ => Op::Adj(n),
        };

        op
    }

    fn without_operand(opcode: i64) -> Op {
        #[rustfmt::skip]
        let op = match opcode {
            10 => Op::Lev,
            11 => Op::Li,
            12 => Op::Lc,
            13 => Op::Si,
            14 => Op::Sc,
            15 => Op::Psh,
            16 => Op::Or,
            17 => Op::Xor,
            18 => Op::And,
            19 => Op::Eq,
            20 => Op::Ne,
            21 => Op::Lt,
            22 => Op::Gt,
            23 => Op::Le,
            24 => Op::Ge,
            25 => Op::Shl,
            26 => Op::Shr,
            27 => Op::Add,
            28 => Op::Sub,
            29 => Op::Mul,
            30 => Op::Div,
            _  => Op::Mod,
        };

        op
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand() {
            Some(operand) => write!(f, "{:<4} {}", self.mnemonic(), operand),
            None => write!(f, "{:<4}", self.mnemonic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    #[test_case(Op::Imm(5), "IMM  5" ; "immediate")]
    #[test_case(Op::Jsri(-8), "JSRI -8" ; "indirect call")]
    #[test_case(Op::Lev, "LEV " ; "leave")]
    #[test_case(Op::Sys(Syscall::Printf), "PRTF" ; "syscall")]
    fn display(op: Op, expected: &str) {
        assert_eq!(op.to_string(), expected)
    }

    #[test]
    fn encode_uses_one_word_per_opcode_and_operand() {
        let ops = vec![
            Op::Ent(2),
            Op::Lea(-1),
            Op::Li,
            Op::Psh,
            Op::Sys(Syscall::Exit),
            Op::Bz(3),
        ];
        let mut words = vec![];
        ops.iter().for_each(|op| op.encode(&mut words));

        assert_eq!(words, vec![8, 2, 0, -1, 11, 15, 43, 6, 3]);
        assert_eq!(words.len(), ops.iter().map(Op::width).sum::<usize>());
        assert_eq!(Op::decode(&words), Ok(ops));
    }

    #[test]
    fn decode_rejects_unknown_opcode() {
        assert_eq!(
            Op::decode(&[1, 7, 44]),
            Err(DecodeError::UnknownOpcode {
                opcode: 44,
                position: 2
            })
        );
        assert_eq!(
            Op::decode(&[-3]),
            Err(DecodeError::UnknownOpcode {
                opcode: -3,
                position: 0
            })
        );
    }

    #[test]
    fn decode_rejects_truncated_operand() {
        assert_eq!(
            Op::decode(&[15, 9]),
            Err(DecodeError::MissingOperand {
                mnemonic: "ADJ",
                position: 1
            })
        );
    }

    #[test]
    fn syscall_ordinals_follow_the_arithmetic_block() {
        assert_eq!(Syscall::Open.ordinal(), 32);
        assert_eq!(Syscall::Exit.ordinal(), 43);
    }
}
