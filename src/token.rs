use std::fmt;
use std::sync::Arc;

use crate::errors::*;
use crate::value::Number;

/// Binary semantics attached to an operator
pub type BinaryFn<N> = Arc<dyn Fn(N, N) -> CalcResult<N> + Send + Sync>;
/// Semantics of a function; receives exactly `arity` arguments in source order
pub type FunctionFn<N> = Arc<dyn Fn(&[N]) -> CalcResult<N> + Send + Sync>;

/// Grouping of equal-precedence operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Associativity {
    /// `a-b-c` is `(a-b)-c`
    Left,
    /// `a^b^c` is `a^(b^c)`
    Right,
}

/// Registry entry for a binary operator.
///
/// `pattern` is a regular expression fragment; it becomes one tagged
/// alternative of the tokenizer's operator sub-pattern.
#[derive(Clone)]
pub struct OperatorDescriptor<N> {
    pub name: String,
    pub pattern: String,
    pub precedence: i32,
    pub associativity: Associativity,
    pub eval: BinaryFn<N>,
}

impl<N> OperatorDescriptor<N> {
    pub fn new<F>(name: &str, pattern: &str, precedence: i32, associativity: Associativity, eval: F) -> Self
    where
        F: Fn(N, N) -> CalcResult<N> + Send + Sync + 'static,
    {
        OperatorDescriptor {
            name: name.to_string(),
            pattern: pattern.to_string(),
            precedence,
            associativity,
            eval: Arc::new(eval),
        }
    }

    /// Pops the stack top when the current operator arrives
    pub(crate) fn yields_to(&self, top: &OperatorDescriptor<N>) -> bool {
        top.precedence > self.precedence
            || (top.precedence == self.precedence && self.associativity == Associativity::Left)
    }
}

impl<N> fmt::Debug for OperatorDescriptor<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OperatorDescriptor")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("precedence", &self.precedence)
            .field("associativity", &self.associativity)
            .finish()
    }
}

/// Registry entry for a named function of fixed arity
#[derive(Clone)]
pub struct FunctionDescriptor<N> {
    pub name: String,
    pub arity: usize,
    pub call: FunctionFn<N>,
}

impl<N> FunctionDescriptor<N> {
    pub fn new<F>(name: &str, arity: usize, call: F) -> Self
    where
        F: Fn(&[N]) -> CalcResult<N> + Send + Sync + 'static,
    {
        FunctionDescriptor {
            name: name.to_string(),
            arity,
            call: Arc::new(call),
        }
    }
}

impl<N> fmt::Debug for FunctionDescriptor<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Registry entry for a named constant (`$name` in expressions)
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantDescriptor<N> {
    pub name: String,
    pub value: N,
}

impl<N> ConstantDescriptor<N> {
    pub fn new(name: &str, value: N) -> Self {
        ConstantDescriptor {
            name: name.to_string(),
            value,
        }
    }
}

/// Lexical unit of an expression. `offset` is the byte offset of the match
/// in the source text and is used for diagnostics only.
#[derive(Clone, Debug)]
pub enum Token<N = f64> {
    /// Literal or an already resolved constant
    Number { offset: usize, value: N },
    /// `[name]`, resolved at evaluation time
    Variable { offset: usize, name: String },
    Operator { offset: usize, text: String, op: Arc<OperatorDescriptor<N>> },
    Function { offset: usize, func: Arc<FunctionDescriptor<N>> },
    ParenOpen { offset: usize },
    ParenClose { offset: usize },
    Comma { offset: usize },
}

impl<N> Token<N> {
    pub fn offset(&self) -> usize {
        match self {
            Token::Number { offset, .. }
            | Token::Variable { offset, .. }
            | Token::Operator { offset, .. }
            | Token::Function { offset, .. }
            | Token::ParenOpen { offset }
            | Token::ParenClose { offset }
            | Token::Comma { offset } => *offset,
        }
    }
}

// Operators and functions compare by registry identity (name), not by callable.
impl<N: PartialEq> PartialEq for Token<N> {
    fn eq(&self, other: &Token<N>) -> bool {
        match (self, other) {
            (Token::Number { offset: o1, value: v1 }, Token::Number { offset: o2, value: v2 }) => o1 == o2 && v1 == v2,
            (Token::Variable { offset: o1, name: n1 }, Token::Variable { offset: o2, name: n2 }) => {
                o1 == o2 && n1 == n2
            }
            (
                Token::Operator { offset: o1, text: t1, op: op1 },
                Token::Operator { offset: o2, text: t2, op: op2 },
            ) => o1 == o2 && t1 == t2 && op1.name == op2.name,
            (Token::Function { offset: o1, func: f1 }, Token::Function { offset: o2, func: f2 }) => {
                o1 == o2 && f1.name == f2.name && f1.arity == f2.arity
            }
            (Token::ParenOpen { offset: o1 }, Token::ParenOpen { offset: o2 })
            | (Token::ParenClose { offset: o1 }, Token::ParenClose { offset: o2 })
            | (Token::Comma { offset: o1 }, Token::Comma { offset: o2 }) => o1 == o2,
            (_, _) => false,
        }
    }
}

impl<N: Number> fmt::Display for Token<N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Number { value, .. } => write!(f, "{}", value.render()),
            Token::Variable { name, .. } => write!(f, "[{}]", name),
            Token::Operator { text, .. } => write!(f, "{}", text),
            Token::Function { func, .. } => write!(f, "{}", func.name),
            Token::ParenOpen { .. } => write!(f, "("),
            Token::ParenClose { .. } => write!(f, ")"),
            Token::Comma { .. } => write!(f, ","),
        }
    }
}

/// Renders a token stream as space separated text, e.g. `3 4 2 * +`
pub fn format_tokens<N: Number>(tokens: &[Token<N>]) -> String {
    tokens.iter().map(|t| t.to_string()).collect::<Vec<String>>().join(" ")
}
