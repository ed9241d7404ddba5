use std::{fmt::Display, rc::Rc};

use crate::value::Value;

/// A compiled program: top-level statements tagged with their source line.
#[derive(Debug)]
pub struct Program(pub Vec<Statement>);

#[derive(Debug)]
pub struct Statement {
    pub line: usize,
    pub node: Node,
}

#[derive(Debug)]
pub enum Node {
    Block(Vec<Node>),
    Assign {
        name: String,
        operator: AssignOperator,
        value: Box<Node>,
    },
    Call(Box<Node>, Vec<Node>),
    Return(Box<Node>),
    Break,
    Continue,
    /// `if`/`elseif` arms in order, then the optional `else` body.
    If(Vec<(Node, Node)>, Option<Box<Node>>),
    While(Box<Node>, Box<Node>),
    For {
        variable: String,
        iterable: Box<Node>,
        body: Box<Node>,
    },
    Function(Rc<FunctionDefinition>),
    Binary(Box<Node>, BinaryOperator, Box<Node>),
    Unary(UnaryOperator, Box<Node>),
    Literal(Value),
    Identifier(String),
    List(Vec<Node>),
}

#[derive(Debug)]
pub struct FunctionDefinition {
    pub parameters: Vec<String>,
    pub body: Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Set,
    Compound(BinaryOperator),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    Index,
    /// Builds the two-element bound list that indexing treats as a slice.
    Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Negate,
    Not,
}

impl BinaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "+" => BinaryOperator::Add,
            "-" => BinaryOperator::Subtract,
            "*" => BinaryOperator::Multiply,
            "/" => BinaryOperator::Divide,
            "%" => BinaryOperator::Modulo,
            "^" => BinaryOperator::Power,
            "==" => BinaryOperator::Equal,
            "!=" => BinaryOperator::NotEqual,
            "<" => BinaryOperator::Less,
            "<=" => BinaryOperator::LessEqual,
            ">" => BinaryOperator::Greater,
            ">=" => BinaryOperator::GreaterEqual,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "[]" => BinaryOperator::Index,
            ":" => BinaryOperator::Slice,
            _ => return None,
        })
    }
}

impl AssignOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        if symbol == "=" {
            return Some(AssignOperator::Set);
        }
        let operator = symbol.strip_suffix('=')?;
        match BinaryOperator::from_symbol(operator)? {
            operator @ (BinaryOperator::Add
            | BinaryOperator::Subtract
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo
            | BinaryOperator::Power) => Some(AssignOperator::Compound(operator)),
            _ => None,
        }
    }
}

impl UnaryOperator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(UnaryOperator::Plus),
            "-" => Some(UnaryOperator::Negate),
            "not" => Some(UnaryOperator::Not),
            _ => None,
        }
    }
}

impl Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Subtract => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
            BinaryOperator::Modulo => write!(f, "%"),
            BinaryOperator::Power => write!(f, "^"),
            BinaryOperator::Equal => write!(f, "=="),
            BinaryOperator::NotEqual => write!(f, "!="),
            BinaryOperator::Less => write!(f, "<"),
            BinaryOperator::LessEqual => write!(f, "<="),
            BinaryOperator::Greater => write!(f, ">"),
            BinaryOperator::GreaterEqual => write!(f, ">="),
            BinaryOperator::And => write!(f, "and"),
            BinaryOperator::Or => write!(f, "or"),
            BinaryOperator::Index => write!(f, "[]"),
            BinaryOperator::Slice => write!(f, ":"),
        }
    }
}

impl Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Plus => write!(f, "+"),
            UnaryOperator::Negate => write!(f, "-"),
            UnaryOperator::Not => write!(f, "not"),
        }
    }
}
