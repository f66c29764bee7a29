use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::fmt;

/// Numeric backend the whole pipeline is generic over.
///
/// The tokenizer only needs to turn a matched literal into a value; every
/// other numeric behavior lives in the operator and function callables, so
/// swapping the backend never changes tokenizing or reordering.
pub trait Number: Clone + PartialEq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Converts a literal matched by the number grammar
    /// (`-?digit+(.digit*)?(E-?digit+)?`, case-insensitive exponent)
    fn parse_literal(s: &str) -> Option<Self>;

    /// Short human readable form used when rendering tokens
    fn render(&self) -> String;
}

// integral floats below this magnitude are rendered without a fraction
const F64_PLAIN_LIMIT: f64 = 1e15;

fn format_f64(g: f64) -> String {
    if g.is_finite() && g.fract() == 0.0 && g.abs() < F64_PLAIN_LIMIT {
        return format!("{}", g as i64);
    }
    let mut buf = dtoa::Buffer::new();
    buf.format(g).to_string()
}

impl Number for f64 {
    fn parse_literal(s: &str) -> Option<Self> {
        s.parse::<f64>().ok()
    }

    fn render(&self) -> String {
        format_f64(*self)
    }
}

fn pow10(n: u32) -> BigInt {
    BigInt::from(10).pow(n)
}

/// Parses a decimal literal exactly: `1.5E-3` becomes `3/2000`
fn str_to_ratio(s: &str) -> Option<BigRational> {
    let (mantissa, exp) = match s.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&s[..pos], s[pos + 1..].parse::<i64>().ok()?),
        None => (s, 0),
    };
    let (neg, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => (true, m),
        None => (false, mantissa),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let digits = format!("{}{}", int_part, frac_part);
    let mut numer = BigInt::parse_bytes(digits.as_bytes(), 10)?;
    let mut denom = BigInt::one();
    let scale = exp.checked_sub(frac_part.len() as i64)?;
    let shift = u32::try_from(scale.unsigned_abs()).ok()?;
    if scale >= 0 {
        numer *= pow10(shift);
    } else {
        denom = pow10(shift);
    }
    if neg {
        numer = -numer;
    }
    Some(BigRational::new(numer, denom))
}

impl Number for BigRational {
    fn parse_literal(s: &str) -> Option<Self> {
        str_to_ratio(s)
    }

    fn render(&self) -> String {
        if self.is_integer() {
            return format!("{}", self.numer());
        }
        let sign = if self.is_negative() { "-" } else { "" };
        let abs = self.abs();
        format!("{}{}/{}", sign, abs.numer(), abs.denom())
    }
}

/// Integer exponent of a rational, when it has one that fits
pub(crate) fn ratio_to_exponent(r: &BigRational) -> Option<i64> {
    if !r.is_integer() {
        return None;
    }
    i64::try_from(r.to_integer()).ok()
}

/// Raises a rational to an integer power by repeated squaring.
/// A negative power of zero yields `None`, and so does `i64::MIN`,
/// which callers are expected to reject first.
pub(crate) fn ratio_pow_int(base: &BigRational, exp: i64) -> Option<BigRational> {
    if exp < 0 {
        if base.is_zero() {
            return None;
        }
        return ratio_pow_int(base, exp.checked_neg()?).map(|r| r.recip());
    }

    let mut e = exp as u64;
    let mut acc = BigRational::one();
    let mut b = base.clone();
    while e > 0 {
        if e & 1 == 1 {
            acc *= &b;
        }
        e >>= 1;
        if e > 0 {
            b = &b * &b;
        }
    }
    Some(acc)
}
