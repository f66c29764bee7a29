use num_rational::BigRational;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::builtin::Builtins;
use crate::errors::*;
use crate::parse::Lexer;
use crate::stack;
use crate::token::*;
use crate::value::Number;

/// Host hook for variables missing from the mapping passed to `calculate`.
/// `None` means the resolver does not know the identifier either.
pub trait VariableResolver<N>: Send + Sync {
    fn resolve_variable(&self, identifier: &str) -> Option<N>;
}

impl<N, F> VariableResolver<N> for F
where
    F: Fn(&str) -> Option<N> + Send + Sync,
{
    fn resolve_variable(&self, identifier: &str) -> Option<N> {
        self(identifier)
    }
}

struct CacheEntry<N> {
    // lexer generation the postfix form was built under
    generation: u64,
    postfix: Arc<Vec<Token<N>>>,
}

/// Expression evaluator: a lexer, a postfix cache keyed by the exact
/// expression text and an optional variable resolver.
///
/// ```
/// use std::collections::HashMap;
/// use mathcalc_lib::Calculator;
///
/// let calc = Calculator::new();
/// let mut vars = HashMap::new();
/// vars.insert("foo".to_string(), 5.0);
/// assert_eq!(calc.calculate("(3^2) * -2 + [foo]", &vars), Ok(-13.0));
/// ```
pub struct Calculator<N = f64> {
    lexer: Lexer<N>,
    cache: RwLock<HashMap<String, CacheEntry<N>>>,
    resolver: Option<Box<dyn VariableResolver<N>>>,
}

impl Default for Calculator<f64> {
    fn default() -> Self {
        Calculator::new()
    }
}

impl Calculator<f64> {
    /// Floating point calculator with the default operators, functions and constants
    pub fn new() -> Self {
        Calculator::from_lexer(Lexer::with_defaults())
    }
}

impl Calculator<BigRational> {
    /// Exact rational calculator: `7/6` stays `7/6`
    pub fn exact() -> Self {
        Calculator::from_lexer(Lexer::with_defaults())
    }
}

impl<N: Builtins> Calculator<N> {
    /// Builds a calculator from caller supplied registries. An empty list
    /// falls back to the backend defaults for that registry.
    pub fn with_registries(
        constants: Vec<ConstantDescriptor<N>>,
        functions: Vec<FunctionDescriptor<N>>,
        operators: Vec<OperatorDescriptor<N>>,
    ) -> CalcResult<Self> {
        let mut lexer = Lexer::new();
        lexer.fill_defaults(constants.is_empty(), functions.is_empty(), operators.is_empty());
        for c in constants {
            lexer.add_constant(&c.name, c.value);
        }
        for f in functions {
            lexer.add_function(f);
        }
        for op in operators {
            lexer.add_operator(op)?;
        }
        Ok(Calculator::from_lexer(lexer))
    }
}

impl<N: Number> Calculator<N> {
    pub fn from_lexer(lexer: Lexer<N>) -> Self {
        Calculator {
            lexer,
            cache: RwLock::new(HashMap::new()),
            resolver: None,
        }
    }

    pub fn with_resolver<R: VariableResolver<N> + 'static>(mut self, resolver: R) -> Self {
        self.set_resolver(resolver);
        self
    }

    pub fn set_resolver<R: VariableResolver<N> + 'static>(&mut self, resolver: R) -> &mut Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    pub fn clear_resolver(&mut self) -> &mut Self {
        self.resolver = None;
        self
    }

    pub fn lexer(&self) -> &Lexer<N> {
        &self.lexer
    }

    /// Direct registry access. Cached postfix forms built before a change
    /// are rebuilt on their next use.
    pub fn lexer_mut(&mut self) -> &mut Lexer<N> {
        &mut self.lexer
    }

    pub fn add_operator(&mut self, op: OperatorDescriptor<N>) -> CalcResult<&mut Self> {
        self.lexer.add_operator(op)?;
        Ok(self)
    }

    pub fn remove_operator(&mut self, name: &str) -> &mut Self {
        self.lexer.remove_operator(name);
        self
    }

    pub fn add_function(&mut self, func: FunctionDescriptor<N>) -> &mut Self {
        self.lexer.add_function(func);
        self
    }

    pub fn remove_function(&mut self, name: &str) -> &mut Self {
        self.lexer.remove_function(name);
        self
    }

    pub fn add_constant(&mut self, name: &str, value: N) -> &mut Self {
        self.lexer.add_constant(name, value);
        self
    }

    pub fn remove_constant(&mut self, name: &str) -> &mut Self {
        self.lexer.remove_constant(name);
        self
    }

    /// Variables referenced by every expression tokenized so far
    pub fn variables(&self) -> Vec<String> {
        self.lexer.variables()
    }

    /// Number of expressions with a cached postfix form
    pub fn cached_expressions(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear_cache(&self) {
        self.cache.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn cached_postfix(&self, expression: &str) -> Option<Arc<Vec<Token<N>>>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let entry = match cache.get(expression) {
            Some(entry) => entry,
            None => {
                tracing::trace!(expression, "postfix cache miss");
                return None;
            }
        };
        if entry.generation != self.lexer.generation() {
            tracing::debug!(
                expression,
                cached = entry.generation,
                current = self.lexer.generation(),
                "stale postfix entry"
            );
            return None;
        }
        tracing::trace!(expression, "postfix cache hit");
        Some(Arc::clone(&entry.postfix))
    }

    // tokenize and reorder once per expression text and registry generation
    fn postfix(&self, expression: &str) -> CalcResult<Arc<Vec<Token<N>>>> {
        if let Some(postfix) = self.cached_postfix(expression) {
            return Ok(postfix);
        }

        let tokens = self.lexer.tokenize(expression)?;
        let postfix = Arc::new(self.lexer.postfix(&tokens)?);
        let entry = CacheEntry {
            generation: self.lexer.generation(),
            postfix: Arc::clone(&postfix),
        };
        // a concurrent caller may have stored the same result already
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(expression.to_string(), entry);
        Ok(postfix)
    }

    fn resolve(&self, offset: usize, name: &str, variables: &HashMap<String, N>) -> CalcResult<N> {
        if let Some(v) = variables.get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.resolver.as_ref().and_then(|r| r.resolve_variable(name)) {
            return Ok(v);
        }
        Err(CalcError::UnknownVariable {
            offset,
            name: name.to_string(),
        })
    }

    /// Evaluates an expression. Variables are looked up in `variables`
    /// first, then through the resolver.
    pub fn calculate(&self, expression: &str, variables: &HashMap<String, N>) -> CalcResult<N> {
        let postfix = self.postfix(expression)?;
        stack::run(&postfix, |offset, name| self.resolve(offset, name, variables))
    }

    /// Evaluates an expression that references no variables, or only ones
    /// the resolver knows
    pub fn eval(&self, expression: &str) -> CalcResult<N> {
        self.calculate(expression, &HashMap::new())
    }
}
