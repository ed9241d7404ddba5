use std::fmt::Display;

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Program,
    StatementList,
    Assignment,
    FunctionCall,
    Return,
    Break,
    Continue,
    If,
    ElseIf,
    Else,
    While,
    For,
    FunctionDefinition,
    ParameterList,
    ArgumentList,
    BinaryOp,
    UnaryOp,
    Literal(LiteralKind),
    Identifier,
    ListLiteral,
    Nil,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Number,
    String,
}

/// One node of the parse tree.
///
/// `text` carries the operator symbol for `BinaryOp`/`UnaryOp`/`Assignment`,
/// the name for `Identifier`, and the literal text for `Literal`/`Boolean`.
/// Index and slice expressions are `BinaryOp`s with the symbols `[]` and `:`.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub text: String,
    pub children: Vec<AstNode>,
    pub span: Span,
}

impl AstNode {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            text: String::new(),
            children: Vec::new(),
            span,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: AstNode) -> Self {
        self.push(child);
        self
    }

    pub fn push(&mut self, child: AstNode) {
        self.children.push(child);
    }

    pub fn line(&self) -> usize {
        self.span.start_line
    }

    fn fmt_indented(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        write!(f, "{:indent$}{}", "", self.kind, indent = depth * 2)?;
        if !self.text.is_empty() {
            write!(f, " ({})", self.text.escape_debug())?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for AstNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Literal(LiteralKind::Number) => write!(f, "Literal<number>"),
            NodeKind::Literal(LiteralKind::String) => write!(f, "Literal<string>"),
            kind => write!(f, "{kind:?}"),
        }
    }
}
