use crate::compiler::Op;
use crate::vm::WORD;

use std::fmt;

/// Base tag plus a pointer level: `char` is 0, `int` is 1 and every level of
/// indirection adds `PTR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Type(i64);

const PTR: i64 = 2;

impl Type {
    pub const CHAR: Type = Type(0);
    pub const INT: Type = Type(1);

    pub fn raw(self) -> i64 {
        self.0
    }

    pub fn pointer_to(self) -> Type {
        Type(self.0 + PTR)
    }

    pub fn deref(self) -> Option<Type> {
        if self.is_pointer() {
            Some(Type(self.0 - PTR))
        } else {
            None
        }
    }

    pub fn is_pointer(self) -> bool {
        self.0 >= PTR
    }

    // Only `char*` points at bytes, everything deeper points at words.
    pub fn scales(self) -> bool {
        self.0 > PTR
    }

    pub fn levels(self) -> usize {
        (self.0 / PTR) as usize
    }

    pub fn is_int_based(self) -> bool {
        self.0 & 1 == 1
    }

    /// Increment applied by `++`/`--`.
    pub fn step(self) -> i64 {
        if self.scales() {
            WORD
        } else {
            1
        }
    }

    pub fn size(self) -> i64 {
        if self == Type::CHAR {
            1
        } else {
            WORD
        }
    }

    pub fn load(self) -> Op {
        if self == Type::CHAR {
            Op::Lc
        } else {
            Op::Li
        }
    }

    pub fn store(self) -> Op {
        if self == Type::CHAR {
            Op::Sc
        } else {
            Op::Si
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if *self == Type::CHAR {
            "char|void"
        } else if self.is_int_based() {
            "int"
        } else {
            "char"
        };

        write!(f, "{}{}", base, "*".repeat(self.levels() % 16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_case::test_case;

    #[test_case(Type::CHAR, 1, 1 ; "char")]
    #[test_case(Type::INT, 8, 1 ; "int")]
    #[test_case(Type::CHAR.pointer_to(), 8, 1 ; "char pointer")]
    #[test_case(Type::INT.pointer_to(), 8, 8 ; "int pointer")]
    #[test_case(Type::CHAR.pointer_to().pointer_to(), 8, 8 ; "char pointer pointer")]
    fn size_and_step(ty: Type, size: i64, step: i64) {
        assert_eq!(ty.size(), size);
        assert_eq!(ty.step(), step);
    }

    #[test]
    fn deref_undoes_pointer_to() {
        let ty = Type::INT.pointer_to().pointer_to();

        assert_eq!(ty.deref(), Some(Type::INT.pointer_to()));
        assert_eq!(ty.deref().and_then(Type::deref), Some(Type::INT));
        assert_eq!(Type::INT.deref(), None);
        assert_eq!(Type::CHAR.deref(), None);
    }

    #[test_case(Type::CHAR, "char|void" ; "char")]
    #[test_case(Type::INT, "int" ; "int")]
    #[test_case(Type::CHAR.pointer_to(), "char*" ; "char pointer")]
    #[test_case(Type::INT.pointer_to().pointer_to(), "int**" ; "int pointer pointer")]
    fn display(ty: Type, expected: &str) {
        assert_eq!(ty.to_string(), expected)
    }
}
