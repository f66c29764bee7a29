use crate::errors::*;
use crate::token::*;
use crate::value::Number;

/// Shunting-yard state: `queue` holds pending operators, functions and
/// open parentheses, `output` collects the postfix sequence.
pub(crate) struct Stack<N> {
    pub(crate) queue: Vec<Token<N>>,
    pub(crate) output: Vec<Token<N>>,
}

impl<N: Number> Stack<N> {
    pub(crate) fn new() -> Self {
        Stack {
            queue: Vec::new(),
            output: Vec::new(),
        }
    }

    // move operators from the queue to output while the operator on top
    // binds at least as tight as the incoming one
    fn pop_while_priority(&mut self, incoming: &OperatorDescriptor<N>) {
        while let Some(e) = self.queue.pop() {
            match &e {
                Token::Operator { op, .. } if incoming.yields_to(op) => self.output.push(e),
                _ => {
                    self.queue.push(e);
                    return;
                }
            }
        }
    }

    // move everything above the nearest open parenthesis to output.
    // Returns false if the queue ran out before one was found.
    fn pop_until_bracket(&mut self, keep_bracket: bool) -> bool {
        while let Some(e) = self.queue.pop() {
            if let Token::ParenOpen { .. } = e {
                if keep_bracket {
                    self.queue.push(e);
                }
                return true;
            }
            self.output.push(e);
        }
        false
    }

    // a function directly below a closed group takes that group as its arguments
    fn pop_function(&mut self) {
        if let Some(Token::Function { .. }) = self.queue.last() {
            if let Some(f) = self.queue.pop() {
                self.output.push(f);
            }
        }
    }

    // Must be called only after the expression ends
    fn pop_all(&mut self) -> CalcResult<()> {
        while let Some(e) = self.queue.pop() {
            match e {
                Token::ParenOpen { offset } | Token::ParenClose { offset } => {
                    return Err(CalcError::IncorrectParenthesis { offset })
                }
                e => self.output.push(e),
            }
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, token: &Token<N>) -> CalcResult<()> {
        match token {
            Token::Number { .. } | Token::Variable { .. } => self.output.push(token.clone()),
            Token::Function { .. } | Token::ParenOpen { .. } => self.queue.push(token.clone()),
            Token::Comma { offset } => {
                if !self.pop_until_bracket(true) {
                    return Err(CalcError::IncorrectExpression {
                        offset: *offset,
                        reason: "misplaced comma",
                    });
                }
            }
            Token::ParenClose { offset } => {
                if !self.pop_until_bracket(false) {
                    return Err(CalcError::IncorrectParenthesis { offset: *offset });
                }
                self.pop_function();
            }
            Token::Operator { op, .. } => {
                self.pop_while_priority(op);
                self.queue.push(token.clone());
            }
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> CalcResult<Vec<Token<N>>> {
        self.pop_all()?;
        Ok(self.output)
    }
}

/// Reorders an infix token sequence into postfix order
pub(crate) fn postfix<N: Number>(tokens: &[Token<N>]) -> CalcResult<Vec<Token<N>>> {
    let mut stack = Stack::new();
    for t in tokens {
        stack.push(t)?;
    }
    stack.finish()
}

// pops `count` operands, the deepest one first
fn take_operands<N>(values: &mut Vec<(usize, N)>, count: usize, offset: usize) -> CalcResult<Vec<(usize, N)>> {
    if values.len() < count {
        return Err(CalcError::IncorrectExpression {
            offset,
            reason: "missing operand",
        });
    }
    Ok(values.split_off(values.len() - count))
}

/// Runs a postfix sequence on a value stack. `lookup` receives the offset
/// and name of every variable token.
pub(crate) fn run<N, F>(postfix: &[Token<N>], mut lookup: F) -> CalcResult<N>
where
    N: Number,
    F: FnMut(usize, &str) -> CalcResult<N>,
{
    // every value remembers where its leftmost operand came from
    let mut values: Vec<(usize, N)> = Vec::new();

    for t in postfix {
        match t {
            Token::Number { offset, value } => values.push((*offset, value.clone())),
            Token::Variable { offset, name } => {
                let v = lookup(*offset, name)?;
                values.push((*offset, v));
            }
            Token::Operator { offset, op, .. } => {
                let mut args = take_operands(&mut values, 2, *offset)?.into_iter();
                if let (Some((at, a)), Some((_, b))) = (args.next(), args.next()) {
                    values.push((at, (op.eval)(a, b)?));
                }
            }
            Token::Function { offset, func } => {
                let args = take_operands(&mut values, func.arity, *offset)?;
                let args: Vec<N> = args.into_iter().map(|(_, v)| v).collect();
                values.push((*offset, (func.call)(&args)?));
            }
            Token::ParenOpen { offset } | Token::ParenClose { offset } | Token::Comma { offset } => {
                return Err(CalcError::IncorrectExpression {
                    offset: *offset,
                    reason: "punctuation in postfix sequence",
                })
            }
        }
    }

    if values.len() > 1 {
        return Err(CalcError::IncorrectExpression {
            offset: values[1].0,
            reason: "missing operator",
        });
    }
    match values.pop() {
        Some((_, v)) => Ok(v),
        None => Err(CalcError::IncorrectExpression {
            offset: 0,
            reason: "empty expression",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::Builtins;
    use std::sync::Arc;

    struct Tokens {
        ops: Vec<Arc<OperatorDescriptor<f64>>>,
        funcs: Vec<Arc<FunctionDescriptor<f64>>>,
        out: Vec<Token<f64>>,
    }

    // hand-built token streams: `n` numbers, `o` operators by text, `f` functions
    impl Tokens {
        fn new() -> Self {
            let ops = f64::operators().into_iter().map(Arc::new).collect();
            let funcs = f64::functions().into_iter().map(Arc::new).collect();
            Tokens {
                ops,
                funcs,
                out: Vec::new(),
            }
        }

        fn at(&self) -> usize {
            self.out.len() * 2
        }

        fn n(mut self, value: f64) -> Self {
            let offset = self.at();
            self.out.push(Token::Number { offset, value });
            self
        }

        fn v(mut self, name: &str) -> Self {
            let offset = self.at();
            self.out.push(Token::Variable {
                offset,
                name: name.to_string(),
            });
            self
        }

        fn o(mut self, text: &str) -> Self {
            let name = match text {
                "+" => "plus",
                "-" => "minus",
                "*" => "multiply",
                "/" => "division",
                "%" => "modulus",
                _ => "power",
            };
            let op = Arc::clone(self.ops.iter().find(|o| o.name == name).unwrap());
            let offset = self.at();
            self.out.push(Token::Operator {
                offset,
                text: text.to_string(),
                op,
            });
            self
        }

        fn f(mut self, name: &str) -> Self {
            let func = Arc::clone(self.funcs.iter().find(|f| f.name == name).unwrap());
            let offset = self.at();
            self.out.push(Token::Function { offset, func });
            self
        }

        fn open(mut self) -> Self {
            let offset = self.at();
            self.out.push(Token::ParenOpen { offset });
            self
        }

        fn close(mut self) -> Self {
            let offset = self.at();
            self.out.push(Token::ParenClose { offset });
            self
        }

        fn comma(mut self) -> Self {
            let offset = self.at();
            self.out.push(Token::Comma { offset });
            self
        }
    }

    fn no_vars(offset: usize, name: &str) -> CalcResult<f64> {
        Err(CalcError::UnknownVariable {
            offset,
            name: name.to_string(),
        })
    }

    #[test]
    fn test_simple_order() {
        // 2 + 3 * 2 + 5
        let t = Tokens::new().n(2.0).o("+").n(3.0).o("*").n(2.0).o("+").n(5.0).out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "2 3 2 * + 5 +");
        assert_eq!(run(&p, no_vars), Ok(13.0));
    }

    #[test]
    fn test_braces() {
        // 2 + 3 * (2 + 5) + 1
        let t = Tokens::new()
            .n(2.0).o("+").n(3.0).o("*").open().n(2.0).o("+").n(5.0).close().o("+").n(1.0)
            .out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "2 3 2 5 + * + 1 +");
        assert_eq!(run(&p, no_vars), Ok(24.0));
    }

    #[test]
    fn test_reference_case() {
        // 3 + 4 * 2 / ( 1 - 5 ) ^ 2 ^ 3
        let t = Tokens::new()
            .n(3.0).o("+").n(4.0).o("*").n(2.0).o("/")
            .open().n(1.0).o("-").n(5.0).close()
            .o("^").n(2.0).o("^").n(3.0)
            .out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "3 4 2 * 1 5 - 2 3 ^ ^ / +");
        assert_eq!(run(&p, no_vars), Ok(3.0001220703125));
    }

    #[test]
    fn test_associativity() {
        let t = Tokens::new().n(2.0).o("^").n(3.0).o("^").n(2.0).out;
        assert_eq!(run(&postfix(&t).unwrap(), no_vars), Ok(512.0));
        let t = Tokens::new().n(10.0).o("-").n(4.0).o("-").n(3.0).out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "10 4 - 3 -");
        assert_eq!(run(&p, no_vars), Ok(3.0));
    }

    #[test]
    fn test_functions() {
        // atan2(max(1, 4), -3) + abs(-5)
        let t = Tokens::new()
            .f("atan2").open().f("max").open().n(1.0).comma().n(4.0).close().comma().n(-3.0).close()
            .o("+").f("abs").open().n(-5.0).close()
            .out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "1 4 max -3 atan2 -5 abs +");
        let v = run(&p, no_vars).unwrap();
        assert!((v - (4f64.atan2(-3.0) + 5.0)).abs() < 1e-12);
    }

    #[test]
    fn test_comma_inside_group_expression() {
        // max(1 + 2, 2 * 2)
        let t = Tokens::new()
            .f("max").open().n(1.0).o("+").n(2.0).comma().n(2.0).o("*").n(2.0).close()
            .out;
        let p = postfix(&t).unwrap();
        assert_eq!(format_tokens(&p), "1 2 + 2 2 * max");
        assert_eq!(run(&p, no_vars), Ok(4.0));
    }

    #[test]
    fn test_parenthesis_errors() {
        // ( 3 + 2
        let t = Tokens::new().open().n(3.0).o("+").n(2.0).out;
        assert_eq!(postfix(&t), Err(CalcError::IncorrectParenthesis { offset: 0 }));
        // 3 + 2 )
        let t = Tokens::new().n(3.0).o("+").n(2.0).close().out;
        assert_eq!(postfix(&t), Err(CalcError::IncorrectParenthesis { offset: 6 }));
    }

    #[test]
    fn test_misplaced_comma() {
        let t = Tokens::new().n(1.0).comma().n(2.0).out;
        assert_eq!(
            postfix(&t),
            Err(CalcError::IncorrectExpression {
                offset: 2,
                reason: "misplaced comma"
            })
        );
    }

    #[test]
    fn test_run_errors() {
        // 5 -3 : two values and no operator
        let t = Tokens::new().n(5.0).n(-3.0).out;
        assert_eq!(
            run(&postfix(&t).unwrap(), no_vars),
            Err(CalcError::IncorrectExpression {
                offset: 2,
                reason: "missing operator"
            })
        );
        // 3 +
        let t = Tokens::new().n(3.0).o("+").out;
        assert_eq!(
            run(&postfix(&t).unwrap(), no_vars),
            Err(CalcError::IncorrectExpression {
                offset: 2,
                reason: "missing operand"
            })
        );
        let empty: Vec<Token<f64>> = Vec::new();
        assert_eq!(
            run(&empty, no_vars),
            Err(CalcError::IncorrectExpression {
                offset: 0,
                reason: "empty expression"
            })
        );
        let t = Tokens::new().n(1.0).o("/").n(0.0).out;
        assert_eq!(run(&postfix(&t).unwrap(), no_vars), Err(CalcError::DividedByZero("1".to_string())));
    }

    #[test]
    fn test_variables() {
        // 4 * [x]
        let t = Tokens::new().n(4.0).o("*").v("x").out;
        let p = postfix(&t).unwrap();
        assert_eq!(run(&p, |_, _| Ok(2.5)), Ok(10.0));
        assert_eq!(
            run(&p, no_vars),
            Err(CalcError::UnknownVariable {
                offset: 4,
                name: "x".to_string()
            })
        );
    }
}
