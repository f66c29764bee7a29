//! Default registries: the operators, functions and constants a calculator
//! starts with unless the caller supplies its own lists.

use lazy_static::lazy_static;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use rand::Rng;
use std::f64::consts;

use crate::errors::*;
use crate::token::{Associativity, ConstantDescriptor, FunctionDescriptor, OperatorDescriptor};
use crate::value::{ratio_pow_int, ratio_to_exponent, Number};

/// Numeric backends that ship default registries
pub trait Builtins: Number {
    fn operators() -> Vec<OperatorDescriptor<Self>>;
    fn functions() -> Vec<FunctionDescriptor<Self>>;
    fn constants() -> Vec<ConstantDescriptor<Self>>;
}

/// Arithmetic behind the default operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Division,
    Modulus,
    Power,
}

// (name, pattern, precedence, associativity, semantics)
const OPERATOR_SHAPES: [(&str, &str, i32, Associativity, BinaryOp); 6] = [
    ("plus", r"\+", 0, Associativity::Left, BinaryOp::Plus),
    ("minus", r"\-", 0, Associativity::Left, BinaryOp::Minus),
    ("multiply", r"\*", 1, Associativity::Left, BinaryOp::Multiply),
    ("division", r"/", 1, Associativity::Left, BinaryOp::Division),
    ("modulus", r"%", 1, Associativity::Left, BinaryOp::Modulus),
    ("power", r"\^", 2, Associativity::Right, BinaryOp::Power),
];

fn build_operators<N, F>(eval: F) -> Vec<OperatorDescriptor<N>>
where
    F: Fn(BinaryOp, N, N) -> CalcResult<N> + Clone + Send + Sync + 'static,
{
    OPERATOR_SHAPES
        .iter()
        .map(|&(name, pattern, precedence, associativity, op)| {
            let eval = eval.clone();
            OperatorDescriptor::new(name, pattern, precedence, associativity, move |a, b| eval(op, a, b))
        })
        .collect()
}

/* ------------------------ f64 ------------------------ */

fn float_op(op: BinaryOp, a: f64, b: f64) -> CalcResult<f64> {
    match op {
        BinaryOp::Plus => Ok(a + b),
        BinaryOp::Minus => Ok(a - b),
        BinaryOp::Multiply => Ok(a * b),
        BinaryOp::Division | BinaryOp::Modulus if b == 0.0 => Err(CalcError::DividedByZero(a.render())),
        BinaryOp::Division => Ok(a / b),
        BinaryOp::Modulus => Ok(a % b),
        BinaryOp::Power => Ok(a.powf(b)),
    }
}

macro_rules! unary {
    ($name:expr, $f:expr) => {
        FunctionDescriptor::new($name, 1, |args: &[f64]| Ok($f(args[0])))
    };
}

macro_rules! binary {
    ($name:expr, $f:expr) => {
        FunctionDescriptor::new($name, 2, |args: &[f64]| Ok($f(args[0], args[1])))
    };
}

// 2^63: the first float beyond the i64 range
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

// uniform integer in [min, max], bounds truncated toward zero
fn rand_between(args: &[f64]) -> CalcResult<f64> {
    let (lo, hi) = (args[0].trunc(), args[1].trunc());
    if !lo.is_finite() || !hi.is_finite() || lo > hi {
        return Err(CalcError::InvalidArgument {
            function: "rand".to_string(),
            reason: format!("empty range [{}, {}]", lo.render(), hi.render()),
        });
    }
    if lo < -I64_LIMIT || hi >= I64_LIMIT {
        return Err(CalcError::InvalidArgument {
            function: "rand".to_string(),
            reason: format!("range [{}, {}] exceeds the integer range", lo.render(), hi.render()),
        });
    }
    let n = rand::thread_rng().gen_range(lo as i64..=hi as i64);
    Ok(n as f64)
}

lazy_static! {
    static ref FLOAT_OPERATORS: Vec<OperatorDescriptor<f64>> = build_operators(float_op);
    static ref FLOAT_FUNCTIONS: Vec<FunctionDescriptor<f64>> = vec![
        unary!("abs", f64::abs),
        unary!("acos", f64::acos),
        unary!("acosh", f64::acosh),
        unary!("asin", f64::asin),
        unary!("asinh", f64::asinh),
        binary!("atan2", f64::atan2),
        unary!("atan", f64::atan),
        unary!("atanh", f64::atanh),
        unary!("ceil", f64::ceil),
        unary!("cos", f64::cos),
        unary!("cosh", f64::cosh),
        unary!("deg2rad", f64::to_radians),
        unary!("exp", f64::exp),
        unary!("floor", f64::floor),
        binary!("hypot", f64::hypot),
        unary!("log10", f64::log10),
        // log(x, base)
        binary!("log", f64::log),
        binary!("max", f64::max),
        binary!("min", f64::min),
        binary!("pow", f64::powf),
        unary!("rad2deg", f64::to_degrees),
        FunctionDescriptor::new("rand", 2, rand_between),
        unary!("round", f64::round),
        unary!("sin", f64::sin),
        unary!("sinh", f64::sinh),
        unary!("sqrt", f64::sqrt),
        unary!("tan", f64::tan),
        unary!("tanh", f64::tanh),
    ];
    static ref FLOAT_CONSTANTS: Vec<ConstantDescriptor<f64>> = vec![
        ConstantDescriptor::new("pi", consts::PI),
        ConstantDescriptor::new("e", consts::E),
    ];
}

impl Builtins for f64 {
    fn operators() -> Vec<OperatorDescriptor<f64>> {
        FLOAT_OPERATORS.clone()
    }

    fn functions() -> Vec<FunctionDescriptor<f64>> {
        FLOAT_FUNCTIONS.clone()
    }

    fn constants() -> Vec<ConstantDescriptor<f64>> {
        FLOAT_CONSTANTS.clone()
    }
}

/* ------------------------ BigRational ------------------------ */

fn exact_pow(name: &str, a: &BigRational, b: &BigRational) -> CalcResult<BigRational> {
    let invalid = |reason: String| CalcError::InvalidArgument {
        function: name.to_string(),
        reason,
    };
    let exp = match ratio_to_exponent(b) {
        None if b.is_integer() => return Err(invalid(format!("exponent {} is out of range", b.render()))),
        None => return Err(invalid(format!("exponent {} is not an integer", b.render()))),
        // the magnitude of i64::MIN has no i64 form
        Some(i64::MIN) => return Err(invalid(format!("exponent {} is out of range", b.render()))),
        Some(exp) => exp,
    };
    ratio_pow_int(a, exp).ok_or_else(|| CalcError::DividedByZero(a.render()))
}

fn exact_op(op: BinaryOp, a: BigRational, b: BigRational) -> CalcResult<BigRational> {
    match op {
        BinaryOp::Plus => Ok(a + b),
        BinaryOp::Minus => Ok(a - b),
        BinaryOp::Multiply => Ok(a * b),
        BinaryOp::Division | BinaryOp::Modulus if b.is_zero() => Err(CalcError::DividedByZero(a.render())),
        BinaryOp::Division => Ok(a / b),
        BinaryOp::Modulus => Ok(a % b),
        BinaryOp::Power => exact_pow("power", &a, &b),
    }
}

lazy_static! {
    static ref EXACT_OPERATORS: Vec<OperatorDescriptor<BigRational>> = build_operators(exact_op);
    static ref EXACT_FUNCTIONS: Vec<FunctionDescriptor<BigRational>> = vec![
        FunctionDescriptor::new("abs", 1, |args: &[BigRational]| Ok(args[0].abs())),
        FunctionDescriptor::new("ceil", 1, |args: &[BigRational]| Ok(args[0].ceil())),
        FunctionDescriptor::new("floor", 1, |args: &[BigRational]| Ok(args[0].floor())),
        FunctionDescriptor::new("round", 1, |args: &[BigRational]| Ok(args[0].round())),
        FunctionDescriptor::new("max", 2, |args: &[BigRational]| Ok(args[0].clone().max(args[1].clone()))),
        FunctionDescriptor::new("min", 2, |args: &[BigRational]| Ok(args[0].clone().min(args[1].clone()))),
        FunctionDescriptor::new("pow", 2, |args: &[BigRational]| exact_pow("pow", &args[0], &args[1])),
    ];
}

impl Builtins for BigRational {
    fn operators() -> Vec<OperatorDescriptor<BigRational>> {
        EXACT_OPERATORS.clone()
    }

    fn functions() -> Vec<FunctionDescriptor<BigRational>> {
        EXACT_FUNCTIONS.clone()
    }

    // no rational constants worth shipping
    fn constants() -> Vec<ConstantDescriptor<BigRational>> {
        Vec::new()
    }
}
