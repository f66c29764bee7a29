//! # Expression calculator
//!
//! Evaluates infix math expressions with operators, functions, named
//! constants and caller supplied variables. An expression is split into
//! tokens by one composite regular expression, reordered into postfix form
//! with the shunting-yard algorithm and evaluated on a value stack. The
//! postfix form of every expression is cached by its exact text, so
//! evaluating the same formula with different variables only repeats the
//! last step.
//!
//! Grammar:
//! * numbers: `-?digit+(.digit*)?(E-?digit+)?`, e.g. `3`, `-2`, `1.5e-3`.
//!   Note that the minus sign belongs to the number, so `5 -3` is two
//!   numbers while `5 - 3` is a subtraction
//! * functions: `name(arg, arg)`, the name is looked up exactly as written
//! * constants: `$name`, replaced by their value while tokenizing
//! * variables: `[name]`, resolved on every evaluation from the variable
//!   map passed to `calculate` and then from the optional resolver
//!
//! Operators (starting from highest priority):
//! * `^` - power, right associative: `2^3^2` is `512`
//! * `*`, `/`, `%` - multiplication, division, modulus
//! * `+`, `-` - addition, subtraction
//!
//! The list of default functions for floating point numbers:
//! * trigonometric functions (including inverted ones): sin, cos, tan, asin, acos, atan, atan2
//! * hyperbolic functions (including inverted ones): sinh, cosh, tanh, asinh, acosh, atanh
//! * exponent, logarithm, square root: exp, log (value and base), log10, sqrt, pow
//! * rounding: ceil, floor, round
//! * angles: deg2rad, rad2deg
//! * others: abs, hypot, min, max, rand (random integer between two bounds)
//!
//! Predefined constants:
//! * `$pi` - 3.14159...
//! * `$e` - 2.71828...
//!
//! Operators, functions and constants are registries: every one of them
//! may be replaced or removed, and new ones added, at runtime.
//!
//! Besides `f64` the calculator works with exact rational numbers
//! (`Calculator::exact()`): `0.1 + 0.2` is exactly `3/10` there. The exact
//! backend supports abs, ceil, floor, round, min, max and pow, and raises
//! numbers to integer powers only.

pub mod builtin;
pub mod calc;
pub mod errors;
pub mod parse;
mod stack;
pub mod token;
pub mod value;

pub use calc::{Calculator, VariableResolver};
pub use errors::{CalcError, CalcResult};
pub use parse::Lexer;
pub use token::{format_tokens, Associativity, ConstantDescriptor, FunctionDescriptor, OperatorDescriptor, Token};
pub use value::Number;
