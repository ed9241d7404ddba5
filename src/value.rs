use std::{fmt::Display, rc::Rc};

use crate::interpreter::Callable;

/// A runtime value. Lists and strings are owned outright, so cloning a value
/// copies it; nothing is shared between bindings except immutable functions.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Nil,
    List(Vec<Value>),
    Function(Rc<Callable>),
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Nil => false,
            Value::Number(n) => *n != 0.0,
            Value::String(_) | Value::List(_) | Value::Function(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Nil => "nil",
            Value::List(_) => "list",
            Value::Function(_) => "function",
        }
    }

    /// The text `print` writes: strings containing whitespace are quoted,
    /// everything else uses the canonical rendering.
    pub fn printed(&self) -> String {
        match self {
            Value::String(s) if s.chars().any(char::is_whitespace) => format!("\"{s}\""),
            value => value.to_string(),
        }
    }
}

/// Equality as used by `==` and `!=`: two values are equal when their
/// canonical renderings are, so `1 == "1"` holds.
pub fn rendered_eq(a: &Value, b: &Value) -> bool {
    a.to_string() == b.to_string()
}

pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else if n.is_finite() {
        format!("{n:.6}")
    } else {
        format!("{n}")
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Function(_) => write!(f, "<function>"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
