use std::{fmt::Debug, rc::Rc};

use super::{environment::Frame, Environment, Flow, RuntimeError};
use crate::{tree::FunctionDefinition, value::Value};

pub type Builtin = fn(&[Value], &mut Environment) -> Result<Value, RuntimeError>;

const ANONYMOUS: &str = "<anonymous>";

/// A function literal together with the frame it was evaluated in.
pub struct UserFunction {
    definition: Rc<FunctionDefinition>,
    captured: Frame,
}

impl UserFunction {
    pub fn new(definition: Rc<FunctionDefinition>, captured: Frame) -> Self {
        Self {
            definition,
            captured,
        }
    }

    fn call(&self, args: Vec<Value>, env: &mut Environment) -> Result<Value, RuntimeError> {
        env.with_call(ANONYMOUS, |env| {
            env.with_frame(|env| {
                for (name, value) in &self.captured {
                    env.define(name.clone(), value.clone());
                }

                let parameters = &self.definition.parameters;
                if args.len() > parameters.len() {
                    return Err(RuntimeError::Arity {
                        function: ANONYMOUS.to_string(),
                        expected: parameters.len().to_string(),
                        found: args.len(),
                    });
                }
                let mut args = args.into_iter();
                for parameter in parameters {
                    env.define(parameter.clone(), args.next().unwrap_or(Value::Nil));
                }

                match self.definition.body.execute(env)? {
                    Flow::Normal(_) => Ok(Value::Nil),
                    Flow::Return(value) => Ok(value),
                    Flow::Break => Err(RuntimeError::StrayControl("break", "loop")),
                    Flow::Continue => Err(RuntimeError::StrayControl("continue", "loop")),
                }
            })
        })
    }
}

pub enum Callable {
    Function(UserFunction),
    Builtin(&'static str, Builtin),
}

impl Callable {
    pub fn call(&self, args: Vec<Value>, env: &mut Environment) -> Result<Value, RuntimeError> {
        match self {
            Callable::Function(function) => function.call(args, env),
            Callable::Builtin(_, f) => f(&args, env),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callable::Function(_) => ANONYMOUS,
            Callable::Builtin(name, _) => name,
        }
    }
}

impl Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Function(function) => f
                .debug_struct("Function")
                .field("parameters", &function.definition.parameters)
                .field("captured", &function.captured.keys().collect::<Vec<_>>())
                .finish(),
            Callable::Builtin(name, _) => write!(f, "Builtin({name})"),
        }
    }
}
