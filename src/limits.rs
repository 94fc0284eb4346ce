//! Numeric bounds shared by the lexer (overflow detection while scanning a
//! literal) and the evaluator (overflow detection while computing).
//!
//! Standard ML's default `int` is a 31-bit two's-complement word on the
//! reference implementations this interpreter imitates; `Overflow` is a
//! runtime exception, not a parse-time concept once a literal is in range.

pub const MAXINT: i64 = 1_073_741_823;
pub const MININT: i64 = -1_073_741_824;

pub fn in_int_range(value: i64) -> bool {
    (MININT..=MAXINT).contains(&value)
}
