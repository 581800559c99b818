use std::iter::Peekable;

use crate::vm::error::{Result, RuntimeError};
use crate::vm::memory::Memory;

/// Widest field width or precision a conversion may ask for.
pub const MAX_FIELD: u64 = 1 << 20;

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
}

impl Spec {
    fn pad(&self, out: &mut Vec<u8>, prefix: &[u8], body: &[u8]) {
        let fill = self.width.saturating_sub(prefix.len() + body.len());

        if self.left {
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
            out.resize(out.len() + fill, b' ');
        } else if self.zero && self.precision.is_none() {
            out.extend_from_slice(prefix);
            out.resize(out.len() + fill, b'0');
            out.extend_from_slice(body);
        } else {
            out.resize(out.len() + fill, b' ');
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
        }
    }

    fn digits(&self, value: u64, radix: u32, upper: bool) -> Vec<u8> {
        if value == 0 && self.precision == Some(0) {
            return vec![];
        }

        let mut digits = match radix {
            8 => format!("{:o}", value),
            16 if upper => format!("{:X}", value),
            16 => format!("{:x}", value),
            _ => value.to_string(),
        }
        .into_bytes();

        if let Some(precision) = self.precision {
            if digits.len() < precision {
                let mut padded = vec![b'0'; precision - digits.len()];
                padded.append(&mut digits);
                digits = padded;
            }
        }
        digits
    }

    fn sign(&self, negative: bool) -> &'static [u8] {
        if negative {
            b"-"
        } else if self.plus {
            b"+"
        } else if self.space {
            b" "
        } else {
            b""
        }
    }
}

fn field(value: u64) -> Result<usize> {
    if value > MAX_FIELD {
        return Err(RuntimeError::FieldTooWide { width: value });
    }
    Ok(value as usize)
}

fn decimal<I: Iterator<Item = u8>>(chars: &mut Peekable<I>) -> u64 {
    let mut value: u64 = 0;
    while let Some(digit) = chars.peek().filter(|ch| ch.is_ascii_digit()).copied() {
        value = value
            .saturating_mul(10)
            .saturating_add(u64::from(digit - b'0'));
        chars.next();
    }
    value
}

/// Expands a C format string. Pointers given to `%s` are read from
/// `memory`; missing arguments read as 0.
pub fn format(fmt: &[u8], args: &[i64], memory: &Memory) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(fmt.len());
    let mut args = args.iter().copied();
    let mut next_arg = move || args.next().unwrap_or(0);
    let mut chars = fmt.iter().copied().peekable();

    while let Some(ch) = chars.next() {
        if ch != b'%' {
            out.push(ch);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                b'-' => spec.left = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'0' => spec.zero = true,
                b'#' => spec.alt = true,
                _ => break,
            }
            chars.next();
        }

        if chars.peek() == Some(&b'*') {
            chars.next();
            let width = next_arg();
            spec.left |= width < 0;
            spec.width = field(width.unsigned_abs())?;
        } else {
            spec.width = field(decimal(&mut chars))?;
        }

        if chars.peek() == Some(&b'.') {
            chars.next();
            if chars.peek() == Some(&b'*') {
                chars.next();
                let precision = next_arg();
                spec.precision = if precision < 0 {
                    None
                } else {
                    Some(field(precision as u64)?)
                };
            } else {
                spec.precision = Some(field(decimal(&mut chars))?);
            }
        }

        while let Some(b'l') | Some(b'h') | Some(b'z') = chars.peek() {
            chars.next();
        }

        match chars.next() {
            Some(b'd') | Some(b'i') => {
                let value = next_arg();
                let digits = spec.digits(value.unsigned_abs(), 10, false);
                spec.pad(&mut out, spec.sign(value < 0), &digits);
            }
            Some(b'u') => {
                let digits = spec.digits(next_arg() as u64, 10, false);
                spec.pad(&mut out, b"", &digits);
            }
            Some(conversion @ b'x') | Some(conversion @ b'X') => {
                let value = next_arg() as u64;
                let upper = conversion == b'X';
                let digits = spec.digits(value, 16, upper);
                let prefix: &[u8] = match (spec.alt && value != 0, upper) {
                    (true, true) => b"0X",
                    (true, false) => b"0x",
                    _ => b"",
                };
                spec.pad(&mut out, prefix, &digits);
            }
            Some(b'o') => {
                let mut digits = spec.digits(next_arg() as u64, 8, false);
                if spec.alt && digits.first() != Some(&b'0') {
                    digits.insert(0, b'0');
                }
                spec.pad(&mut out, b"", &digits);
            }
            Some(b'p') => {
                let digits = spec.digits(next_arg() as u64, 16, false);
                spec.pad(&mut out, b"0x", &digits);
            }
            Some(b'c') => {
                spec.precision = None;
                spec.zero = false;
                spec.pad(&mut out, b"", &[next_arg() as u8]);
            }
            Some(b's') => {
                let text = memory.read_cstr(next_arg())?;
                let text = match spec.precision {
                    Some(precision) if precision < text.len() => &text[..precision],
                    _ => text,
                };
                spec.zero = false;
                spec.pad(&mut out, b"", text);
            }
            Some(b'%') => out.push(b'%'),
            Some(other) => {
                out.push(b'%');
                out.push(other);
            }
            None => out.push(b'%'),
        }
    }

    Ok(out)
}
