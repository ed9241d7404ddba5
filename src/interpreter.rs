mod callable;
mod environment;
mod operators;
mod stdlib;

use std::{
    cell::RefCell,
    io::{BufRead, Write},
    rc::Rc,
};

use crate::{
    tree::{AssignOperator, BinaryOperator, Node, Program},
    value::Value,
};

pub use self::{
    callable::{Builtin, Callable, UserFunction},
    environment::{Environment, Frame},
};

/// The outcome of executing one node. Only `Normal` carries on to the next
/// statement; the other signals unwind to the construct that consumes them.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal(Value),
    Break,
    Continue,
    Return(Value),
}

impl Flow {
    fn keyword(&self) -> &'static str {
        match self {
            Flow::Normal(_) => "expression",
            Flow::Break => "break",
            Flow::Continue => "continue",
            Flow::Return(_) => "return",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Type error: {0}")]
    Type(String),
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("{function} expects {expected} arguments, got {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },
    #[error("Range error: {0}")]
    Range(String),
    #[error("'{0}' outside of a {1}")]
    StrayControl(&'static str, &'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("Error executing statement at line {line}: {kind}")]
pub struct ExecutionError {
    pub kind: RuntimeError,
    pub line: usize,
}

pub struct Interpreter {
    environment: Environment,
}

impl Interpreter {
    pub fn new(stdout: Rc<RefCell<dyn Write>>, stdin: Rc<RefCell<dyn BufRead>>) -> Self {
        let mut environment = Environment::new(stdout, stdin);
        stdlib::install(&mut environment);
        Self { environment }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), ExecutionError> {
        for statement in &program.0 {
            let kind = match statement.node.execute(&mut self.environment) {
                Ok(Flow::Normal(_)) => continue,
                Ok(Flow::Return(_)) => RuntimeError::StrayControl("return", "function"),
                Ok(flow) => RuntimeError::StrayControl(flow.keyword(), "loop"),
                Err(kind) => kind,
            };
            return Err(ExecutionError {
                kind,
                line: statement.line,
            });
        }
        log::debug!("program finished");
        Ok(())
    }
}

impl Node {
    /// Runs a statement. Expression nodes yield their value as `Flow::Normal`.
    pub fn execute(&self, env: &mut Environment) -> Result<Flow, RuntimeError> {
        let flow = match self {
            Node::Block(statements) => {
                for statement in statements {
                    match statement.execute(env)? {
                        Flow::Normal(_) => {}
                        flow => return Ok(flow),
                    }
                }
                Flow::Normal(Value::Nil)
            }
            Node::Assign {
                name,
                operator,
                value,
            } => {
                let value = value.evaluate(env)?;
                let value = match operator {
                    AssignOperator::Set => value,
                    AssignOperator::Compound(operator) => {
                        operators::binary(*operator, env.get(name)?, value)?
                    }
                };
                env.set(name, value);
                Flow::Normal(Value::Nil)
            }
            Node::Return(value) => Flow::Return(value.evaluate(env)?),
            Node::Break => Flow::Break,
            Node::Continue => Flow::Continue,
            Node::If(arms, otherwise) => {
                for (condition, body) in arms {
                    if condition.evaluate(env)?.is_truthy() {
                        return body.execute(env);
                    }
                }
                match otherwise {
                    Some(body) => body.execute(env)?,
                    None => Flow::Normal(Value::Nil),
                }
            }
            Node::While(condition, body) => {
                while condition.evaluate(env)?.is_truthy() {
                    match body.execute(env)? {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Flow::Normal(Value::Nil)
            }
            Node::For {
                variable,
                iterable,
                body,
            } => {
                let items = match iterable.evaluate(env)? {
                    Value::List(items) => items,
                    value => {
                        return Err(RuntimeError::Type(format!(
                            "for loop expects a list, got {}",
                            value.type_name()
                        )))
                    }
                };
                for item in items {
                    let flow = env.with_frame(|env| {
                        env.define(variable.clone(), item);
                        body.execute(env)
                    })?;
                    match flow {
                        Flow::Break => break,
                        Flow::Normal(_) | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Flow::Normal(Value::Nil)
            }
            expression => Flow::Normal(expression.evaluate(env)?),
        };
        Ok(flow)
    }

    /// Evaluates an expression to a value.
    pub fn evaluate(&self, env: &mut Environment) -> Result<Value, RuntimeError> {
        match self {
            Node::Call(callee, args) => {
                let callable = match callee.evaluate(env)? {
                    Value::Function(callable) => callable,
                    value => {
                        return Err(RuntimeError::Type(format!(
                            "{} '{value}' is not a function",
                            value.type_name()
                        )))
                    }
                };
                let args = args
                    .iter()
                    .map(|arg| arg.evaluate(env))
                    .collect::<Result<Vec<_>, _>>()?;
                log::trace!("calling {} with {} arguments", callable.name(), args.len());
                callable.call(args, env)
            }
            Node::Function(definition) => Ok(Value::Function(Rc::new(Callable::Function(
                UserFunction::new(definition.clone(), env.current().clone()),
            )))),
            Node::Binary(left, BinaryOperator::And, right) => {
                if !left.evaluate(env)?.is_truthy() {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(right.evaluate(env)?.is_truthy()))
            }
            Node::Binary(left, BinaryOperator::Or, right) => {
                if left.evaluate(env)?.is_truthy() {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(right.evaluate(env)?.is_truthy()))
            }
            Node::Binary(left, operator, right) => {
                let left = left.evaluate(env)?;
                let right = right.evaluate(env)?;
                operators::binary(*operator, left, right)
            }
            Node::Unary(operator, operand) => operators::unary(*operator, operand.evaluate(env)?),
            Node::Literal(value) => Ok(value.clone()),
            Node::Identifier(name) => env.get(name),
            Node::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| item.evaluate(env))
                    .collect::<Result<Vec<_>, _>>()?,
            )),
            statement => match statement.execute(env)? {
                Flow::Normal(value) => Ok(value),
                flow => Err(RuntimeError::StrayControl(flow.keyword(), "statement")),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{compiler, parser, tokenizer};

    fn run(source: &str) -> (Result<(), ExecutionError>, String, Interpreter) {
        let stdout = Rc::new(RefCell::new(Vec::new()));
        let stdin: &'static [u8] = b"";
        let mut interpreter = Interpreter::new(stdout.clone(), Rc::new(RefCell::new(stdin)));
        let tokens = tokenizer::tokens(source).unwrap();
        let program = compiler::compile(&parser::program(&tokens).unwrap()).unwrap();
        let result = interpreter.interpret(&program);
        let output = String::from_utf8(stdout.borrow().clone()).unwrap();
        (result, output, interpreter)
    }

    #[test]
    fn test_frames_are_popped_after_errors() {
        let source = "f = function()\n  for x in [1]\n    y = 1 + nil\n  end for\nend function\nf()";
        let (result, _, interpreter) = run(source);
        let error = result.unwrap_err();
        assert_eq!(error.line, 6);
        assert!(matches!(error.kind, RuntimeError::Type(_)));
        assert_eq!(interpreter.environment().depth(), 0);
        assert!(interpreter.environment().call_stack().is_empty());
    }

    #[test]
    fn test_loop_frames_are_popped_on_break_and_return() {
        let source = "f = function()\n  for x in [1, 2]\n    return x\n  end for\nend function\n\
                      for x in [1, 2]\n  break\nend for\nprint(f())";
        let (result, output, interpreter) = run(source);
        result.unwrap();
        assert_eq!(output, "1");
        assert_eq!(interpreter.environment().depth(), 0);
    }

    #[test]
    fn test_stray_signals_are_errors() {
        let (result, _, _) = run("x = 1\nreturn x");
        let error = result.unwrap_err();
        assert_eq!(error.line, 2);
        assert!(matches!(
            error.kind,
            RuntimeError::StrayControl("return", "function")
        ));

        let (result, _, _) = run("break");
        assert!(matches!(
            result.unwrap_err().kind,
            RuntimeError::StrayControl("break", "loop")
        ));

        let (result, _, _) = run("f = function()\n  continue\nend function\nf()");
        assert!(matches!(
            result.unwrap_err().kind,
            RuntimeError::StrayControl("continue", "loop")
        ));
    }

    #[test]
    fn test_and_or_short_circuit() {
        let (result, output, _) = run("print(false and undefined, true or undefined)");
        result.unwrap();
        assert_eq!(output, "falsetrue");
    }

    #[test]
    fn test_compound_assignment_requires_binding() {
        let (result, _, _) = run("x += 1");
        assert!(matches!(
            result.unwrap_err().kind,
            RuntimeError::UndefinedVariable(name) if name == "x"
        ));
    }

    #[test]
    fn test_calling_a_non_function() {
        let (result, _, _) = run("x = 3\nx()");
        assert!(matches!(result.unwrap_err().kind, RuntimeError::Type(_)));
    }
}
