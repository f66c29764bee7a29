use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::builtin::Builtins;
use crate::errors::*;
use crate::stack;
use crate::token::*;
use crate::value::Number;

const NUMBER: &str = r"-?[0-9]+\.?[0-9]*(?:E-?[0-9]+)?";
// anything from U+007F up counts as a letter, like the 0x7F-0xFF bytes of UTF-8
const IDENT: &str = r"[A-Za-z_\x{7F}-\x{10FFFF}][A-Za-z0-9_\x{7F}-\x{10FFFF}]*";

// group names in classification priority order
const NUMBER_GROUP: &str = "number";
const OPERATOR_GROUP: &str = "operator";
const FUNCTION_GROUP: &str = "function";
const OPEN_GROUP: &str = "open";
const CLOSE_GROUP: &str = "close";
const COMMA_GROUP: &str = "comma";
const CONSTANT_GROUP: &str = "constant";
const VARIABLE_GROUP: &str = "variable";

/// Scanning pattern built from the operator registry
struct CompiledPattern {
    regex: Regex,
    // `op_<index>` for every registered operator, same order as the registry
    op_groups: Vec<String>,
}

/// Lexical analyzer: owns the operator, function and constant registries,
/// turns expression text into tokens and reorders tokens into postfix.
///
/// The scanning pattern is compiled lazily and dropped on every registry
/// change. Variables met by `tokenize` are collected across calls.
pub struct Lexer<N = f64> {
    operators: Vec<Arc<OperatorDescriptor<N>>>,
    functions: HashMap<String, Arc<FunctionDescriptor<N>>>,
    constants: HashMap<String, N>,
    pattern: RwLock<Option<Arc<CompiledPattern>>>,
    variables: Mutex<Vec<String>>,
    generation: u64,
}

impl<N: Number> Default for Lexer<N> {
    fn default() -> Lexer<N> {
        Lexer {
            operators: Vec::new(),
            functions: HashMap::new(),
            constants: HashMap::new(),
            pattern: RwLock::new(None),
            variables: Mutex::new(Vec::new()),
            generation: 0,
        }
    }
}

impl<N: Builtins> Lexer<N> {
    /// Lexer populated with the backend's default operators, functions and constants
    pub fn with_defaults() -> Self {
        let mut lexer = Lexer::new();
        lexer.fill_defaults(true, true, true);
        lexer
    }

    pub(crate) fn fill_defaults(&mut self, constants: bool, functions: bool, operators: bool) {
        if constants {
            for c in N::constants() {
                self.add_constant(&c.name, c.value);
            }
        }
        if functions {
            for f in N::functions() {
                self.add_function(f);
            }
        }
        if operators {
            // default tables are static data covered by tests
            for op in N::operators() {
                self.register_operator(op);
            }
        }
    }
}

impl<N: Number> Lexer<N> {
    /// Lexer with empty registries
    pub fn new() -> Self {
        Default::default()
    }

    // every registry write drops the compiled pattern and moves the generation on
    fn invalidate(&mut self) {
        self.pattern = RwLock::new(None);
        self.generation = self.generation.wrapping_add(1);
    }

    /// Registry generation, changes on every add/remove
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Checks that an operator can take part in the composite pattern:
    /// a non-empty name and a pattern that compiles, has no named groups
    /// and never matches the empty string
    fn validate_operator(op: &OperatorDescriptor<N>) -> CalcResult<()> {
        let invalid = |reason: String| CalcError::InvalidOperator {
            name: op.name.clone(),
            reason,
        };
        if op.name.is_empty() {
            return Err(invalid("empty name".to_string()));
        }
        if op.pattern.is_empty() {
            return Err(invalid("empty pattern".to_string()));
        }
        let re = Regex::new(&op.pattern).map_err(|e| invalid(e.to_string()))?;
        if re.capture_names().flatten().next().is_some() {
            return Err(invalid("named groups are not allowed in operator patterns".to_string()));
        }
        if re.is_match("") {
            return Err(invalid("pattern matches the empty string".to_string()));
        }
        Ok(())
    }

    fn register_operator(&mut self, op: OperatorDescriptor<N>) {
        tracing::trace!(name = %op.name, pattern = %op.pattern, "register operator");
        let op = Arc::new(op);
        match self.operators.iter().position(|o| o.name == op.name) {
            Some(idx) => self.operators[idx] = op,
            None => self.operators.push(op),
        }
        self.invalidate();
    }

    /// Registers an operator, replacing one with the same name in place
    pub fn add_operator(&mut self, op: OperatorDescriptor<N>) -> CalcResult<&mut Self> {
        Self::validate_operator(&op)?;
        self.register_operator(op);
        Ok(self)
    }

    pub fn remove_operator(&mut self, name: &str) -> &mut Self {
        self.operators.retain(|o| o.name != name);
        self.invalidate();
        self
    }

    /// Registers a function; the name is matched exactly (case-sensitive)
    pub fn add_function(&mut self, func: FunctionDescriptor<N>) -> &mut Self {
        tracing::trace!(name = %func.name, arity = func.arity, "register function");
        self.functions.insert(func.name.clone(), Arc::new(func));
        self.invalidate();
        self
    }

    pub fn remove_function(&mut self, name: &str) -> &mut Self {
        self.functions.remove(name);
        self.invalidate();
        self
    }

    /// Registers a constant, referenced as `$name` in expressions
    pub fn add_constant(&mut self, name: &str, value: N) -> &mut Self {
        tracing::trace!(name, "register constant");
        self.constants.insert(name.to_string(), value);
        self.invalidate();
        self
    }

    pub fn remove_constant(&mut self, name: &str) -> &mut Self {
        self.constants.remove(name);
        self.invalidate();
        self
    }

    /// Registered operators in registration order
    pub fn operators(&self) -> &[Arc<OperatorDescriptor<N>>] {
        &self.operators
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor<N>> {
        self.functions.get(name).map(|f| f.as_ref())
    }

    pub fn constant(&self, name: &str) -> Option<&N> {
        self.constants.get(name)
    }

    /// Distinct variable identifiers seen by `tokenize` so far, in order
    /// of first appearance. Not reset between calls.
    pub fn variables(&self) -> Vec<String> {
        self.variables.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn compile(&self) -> CalcResult<CompiledPattern> {
        let op_groups: Vec<String> = (0..self.operators.len()).map(|i| format!("op_{}", i)).collect();
        let mut alternatives = vec![
            format!("(?P<{}>{})", NUMBER_GROUP, NUMBER),
            format!("(?P<{}>{})", FUNCTION_GROUP, IDENT),
            format!(r"(?P<{}>\${})", CONSTANT_GROUP, IDENT),
            format!(r"(?P<{}>\[{}\])", VARIABLE_GROUP, IDENT),
            format!(r"(?P<{}>\()", OPEN_GROUP),
            format!(r"(?P<{}>\))", CLOSE_GROUP),
            format!(r"(?P<{}>,)", COMMA_GROUP),
        ];
        // an empty group would match the empty string everywhere
        if !self.operators.is_empty() {
            let ops: Vec<String> = self
                .operators
                .iter()
                .zip(op_groups.iter())
                .map(|(op, group)| format!("(?P<{}>{})", group, op.pattern))
                .collect();
            alternatives.push(format!("(?P<{}>{})", OPERATOR_GROUP, ops.join("|")));
        }

        let regex = RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| CalcError::InvalidPattern(e.to_string()))?;
        tracing::debug!(operators = self.operators.len(), "compiled token pattern");
        Ok(CompiledPattern { regex, op_groups })
    }

    fn compiled(&self) -> CalcResult<Arc<CompiledPattern>> {
        if let Some(p) = self.pattern.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(p));
        }
        let compiled = Arc::new(self.compile()?);
        *self.pattern.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    // text between two matches may only be whitespace
    fn check_gap(input: &str, from: usize, to: usize) -> CalcResult<()> {
        let gap = &input[from..to];
        match gap.find(|c: char| !c.is_whitespace()) {
            None => Ok(()),
            Some(pos) => Err(CalcError::UnknownToken {
                offset: from + pos,
                text: gap.trim().to_string(),
            }),
        }
    }

    fn remember_variable(&self, name: &str) {
        let mut vars = self.variables.lock().unwrap_or_else(PoisonError::into_inner);
        if !vars.iter().any(|v| v == name) {
            vars.push(name.to_string());
        }
    }

    fn create_token(&self, caps: &Captures, compiled: &CompiledPattern) -> CalcResult<Token<N>> {
        // fixed priority: the first group that took part in the match decides
        let groups = [
            NUMBER_GROUP,
            OPERATOR_GROUP,
            FUNCTION_GROUP,
            OPEN_GROUP,
            CLOSE_GROUP,
            COMMA_GROUP,
            CONSTANT_GROUP,
            VARIABLE_GROUP,
        ];
        let found = groups
            .iter()
            .find_map(|g| caps.name(g).filter(|m| !m.as_str().is_empty()).map(|m| (*g, m)));
        let (group, m) = match found {
            Some(found) => found,
            None => {
                let whole = caps.get(0).map_or("", |m| m.as_str());
                let offset = caps.get(0).map_or(0, |m| m.start());
                return Err(CalcError::UnknownToken {
                    offset,
                    text: whole.to_string(),
                });
            }
        };
        let offset = m.start();
        let text = m.as_str();

        match group {
            NUMBER_GROUP => match N::parse_literal(text) {
                Some(value) => Ok(Token::Number { offset, value }),
                None => Err(CalcError::InvalidNumber {
                    offset,
                    text: text.to_string(),
                }),
            },
            OPERATOR_GROUP => {
                let idx = compiled.op_groups.iter().position(|g| caps.name(g).is_some());
                match idx.and_then(|i| self.operators.get(i)) {
                    Some(op) => Ok(Token::Operator {
                        offset,
                        text: text.to_string(),
                        op: Arc::clone(op),
                    }),
                    None => Err(CalcError::UnknownOperator {
                        offset,
                        text: text.to_string(),
                    }),
                }
            }
            FUNCTION_GROUP => match self.functions.get(text) {
                Some(func) => Ok(Token::Function {
                    offset,
                    func: Arc::clone(func),
                }),
                None => Err(CalcError::UnknownFunction {
                    offset,
                    name: text.to_string(),
                }),
            },
            OPEN_GROUP => Ok(Token::ParenOpen { offset }),
            CLOSE_GROUP => Ok(Token::ParenClose { offset }),
            COMMA_GROUP => Ok(Token::Comma { offset }),
            CONSTANT_GROUP => {
                let name = &text[1..];
                match self.constants.get(name) {
                    Some(value) => Ok(Token::Number {
                        offset,
                        value: value.clone(),
                    }),
                    None => Err(CalcError::UnknownConstant {
                        offset,
                        name: name.to_string(),
                    }),
                }
            }
            _ => {
                let name = &text[1..text.len() - 1];
                self.remember_variable(name);
                Ok(Token::Variable {
                    offset,
                    name: name.to_string(),
                })
            }
        }
    }

    /// Splits an expression into tokens.
    ///
    /// Whitespace between tokens is skipped, any other text that matches
    /// no grammar is an `UnknownToken` error. Constants are replaced by
    /// their values here; variables stay symbolic.
    pub fn tokenize(&self, input: &str) -> CalcResult<Vec<Token<N>>> {
        let compiled = self.compiled()?;
        let mut tokens = Vec::new();
        let mut last = 0;
        for caps in compiled.regex.captures_iter(input) {
            let Some(m) = caps.get(0) else { continue };
            Self::check_gap(input, last, m.start())?;
            last = m.end();
            tokens.push(self.create_token(&caps, &compiled)?);
        }
        Self::check_gap(input, last, input.len())?;
        Ok(tokens)
    }

    /// Reorders infix tokens into postfix (reverse Polish) order
    pub fn postfix(&self, tokens: &[Token<N>]) -> CalcResult<Vec<Token<N>>> {
        stack::postfix(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexer() -> Lexer<f64> {
        let mut lexer = Lexer::new();
        for op in f64::operators() {
            lexer.add_operator(op).unwrap();
        }
        for f in f64::functions().into_iter().filter(|f| f.name == "abs" || f.name == "atan2") {
            lexer.add_function(f);
        }
        lexer.add_constant("pi", std::f64::consts::PI);
        lexer
    }

    fn rendered(lexer: &Lexer<f64>, expr: &str) -> String {
        format_tokens(&lexer.tokenize(expr).unwrap())
    }

    #[test]
    fn test_tokenize_offsets() {
        let lexer = lexer();
        let tokens = lexer.tokenize("3 + 2").unwrap();
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset()).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert_eq!(tokens[0], Token::Number { offset: 0, value: 3.0 });
        assert_eq!(tokens[2], Token::Number { offset: 4, value: 2.0 });
        match &tokens[1] {
            Token::Operator { text, op, .. } => {
                assert_eq!(text, "+");
                assert_eq!(op.name, "plus");
            }
            t => panic!("expected operator, got {:?}", t),
        }
    }

    #[test]
    fn test_tokenize_kinds() {
        let lexer = lexer();
        assert_eq!(rendered(&lexer, "7/6"), "7 / 6");
        assert_eq!(rendered(&lexer, "(3^2) * -2 + [foo]"), "( 3 ^ 2 ) * -2 + [foo]");
        assert_eq!(rendered(&lexer, "atan2(4, -3)"), "atan2 ( 4 , -3 )");
        assert_eq!(rendered(&lexer, "1.5E-3 % 2e2"), "0.0015 % 200");

        let tokens = lexer.tokenize("abs(-5)").unwrap();
        assert_eq!(tokens[0].offset(), 0);
        assert_eq!(tokens[1], Token::ParenOpen { offset: 3 });
        assert_eq!(tokens[2], Token::Number { offset: 4, value: -5.0 });
        assert_eq!(tokens[3], Token::ParenClose { offset: 6 });
    }

    #[test]
    fn test_constants_resolved_early() {
        let lexer = lexer();
        let tokens = lexer.tokenize("3^5 * 5 * $pi").unwrap();
        assert_eq!(tokens[6], Token::Number { offset: 10, value: std::f64::consts::PI });
        assert_eq!(
            lexer.tokenize("$tau"),
            Err(CalcError::UnknownConstant { offset: 0, name: "tau".to_string() })
        );
    }

    #[test]
    fn test_unknown_things() {
        let lexer = lexer();
        assert_eq!(
            lexer.tokenize("2 + sin(1)"),
            Err(CalcError::UnknownFunction { offset: 4, name: "sin".to_string() })
        );
        assert_eq!(
            lexer.tokenize("3 # 2"),
            Err(CalcError::UnknownToken { offset: 2, text: "#".to_string() })
        );
        assert_eq!(
            lexer.tokenize("3 + 2 ;"),
            Err(CalcError::UnknownToken { offset: 6, text: ";".to_string() })
        );
        // function lookup is exact even though the pattern is case-insensitive
        assert!(matches!(lexer.tokenize("ABS(1)"), Err(CalcError::UnknownFunction { .. })));
    }

    #[test]
    fn test_variables_collected() {
        let lexer = lexer();
        lexer.tokenize("2 + 3 + [VAR1] + [VAR2] * [VAR1]").unwrap();
        assert_eq!(lexer.variables(), vec!["VAR1".to_string(), "VAR2".to_string()]);
        lexer.tokenize("[VAR3] - [VAR2]").unwrap();
        assert_eq!(lexer.variables(), vec!["VAR1", "VAR2", "VAR3"]);
    }

    #[test]
    fn test_registry_changes_recompile() {
        let mut lexer = lexer();
        assert!(lexer.tokenize("1 - 2").is_ok());
        let before = lexer.generation();
        lexer.remove_operator("minus");
        assert!(lexer.generation() > before);
        assert_eq!(
            lexer.tokenize("1 - 2"),
            Err(CalcError::UnknownToken { offset: 2, text: "-".to_string() })
        );
        lexer
            .add_operator(OperatorDescriptor::new("minus", r"\-", 0, Associativity::Left, |a: f64, b: f64| Ok(a - b)))
            .unwrap();
        assert_eq!(rendered(&lexer, "1 - 2"), "1 - 2");
    }

    #[test]
    fn test_no_operators() {
        let lexer: Lexer<f64> = Lexer::new();
        assert_eq!(rendered(&lexer, "(1, [x])"), "( 1 , [x] )");
        assert!(matches!(lexer.tokenize("1 + 2"), Err(CalcError::UnknownToken { offset: 2, .. })));
    }

    #[test]
    fn test_invalid_operators() {
        let mut lexer: Lexer<f64> = Lexer::new();
        let op = |name: &str, pattern: &str| {
            OperatorDescriptor::new(name, pattern, 0, Associativity::Left, |a: f64, b: f64| Ok(a + b))
        };
        assert!(matches!(lexer.add_operator(op("", r"\+")), Err(CalcError::InvalidOperator { .. })));
        assert!(matches!(lexer.add_operator(op("plus", "")), Err(CalcError::InvalidOperator { .. })));
        assert!(matches!(lexer.add_operator(op("plus", r"(\+")), Err(CalcError::InvalidOperator { .. })));
        assert!(matches!(lexer.add_operator(op("plus", r"\+?")), Err(CalcError::InvalidOperator { .. })));
        assert!(matches!(
            lexer.add_operator(op("plus", r"(?P<x>\+)")),
            Err(CalcError::InvalidOperator { .. })
        ));
        assert!(lexer.operators().is_empty());
        assert!(lexer.add_operator(op("plus", r"\+")).is_ok());
        assert_eq!(lexer.operators().len(), 1);
    }

    #[test]
    fn test_default_operators_are_valid() {
        for op in f64::operators() {
            assert_eq!(Lexer::validate_operator(&op), Ok(()));
        }
        let lexer: Lexer<f64> = Lexer::with_defaults();
        assert_eq!(lexer.operators().len(), 6);
        assert!(lexer.function("hypot").is_some());
        assert_eq!(lexer.constant("e"), Some(&std::f64::consts::E));
    }

    #[test]
    fn test_replace_and_remove() {
        let mut lexer = lexer();
        lexer.add_constant("pi", 3.0);
        assert_eq!(rendered(&lexer, "$pi"), "3");
        lexer.remove_constant("pi").remove_function("abs");
        assert!(lexer.constant("pi").is_none());
        assert!(lexer.function("abs").is_none());
        assert!(lexer.function("atan2").is_some());
    }
}
