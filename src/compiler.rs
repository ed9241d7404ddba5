use std::rc::Rc;

use crate::{
    ast::{AstNode, LiteralKind, NodeKind},
    tree::{
        AssignOperator, BinaryOperator, FunctionDefinition, Node, Program, Statement,
        UnaryOperator,
    },
    value::Value,
};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Cannot build a {kind} node in this position (line {line})")]
    UnsupportedNode { kind: NodeKind, line: usize },
    #[error("Malformed {kind} node at line {line}: {reason}")]
    MalformedNode {
        kind: NodeKind,
        line: usize,
        reason: &'static str,
    },
    #[error("Unknown operator '{operator}' at line {line}")]
    UnknownOperator { operator: String, line: usize },
    #[error("Invalid number literal '{text}' at line {line}")]
    InvalidNumber { text: String, line: usize },
}

/// Turns a parsed `Program` into its executable tree.
pub fn compile(ast: &AstNode) -> Result<Program, CompileError> {
    if ast.kind != NodeKind::Program {
        return Err(unsupported(ast));
    }
    let statements = child(ast, 0, "program without a statement list")?;
    expect_kind(statements, NodeKind::StatementList)?;

    let program = statements
        .children
        .iter()
        .map(|statement| {
            Ok(Statement {
                line: statement.line(),
                node: node(statement)?,
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()
        .map(Program)?;

    log::debug!("compiled {} top-level statements", program.0.len());
    Ok(program)
}

fn node(ast: &AstNode) -> Result<Node, CompileError> {
    let node = match ast.kind {
        NodeKind::StatementList => Node::Block(nodes(&ast.children)?),
        NodeKind::Assignment => {
            let target = child(ast, 0, "assignment without a target")?;
            expect_kind(target, NodeKind::Identifier)?;
            let operator = AssignOperator::from_symbol(&ast.text)
                .ok_or_else(|| unknown_operator(ast))?;
            Node::Assign {
                name: target.text.clone(),
                operator,
                value: boxed(child(ast, 1, "assignment without a value")?)?,
            }
        }
        NodeKind::FunctionCall => {
            let callee = child(ast, 0, "call without a callee")?;
            let arguments = child(ast, 1, "call without arguments")?;
            expect_kind(arguments, NodeKind::ArgumentList)?;
            Node::Call(Box::new(node(callee)?), nodes(&arguments.children)?)
        }
        NodeKind::Return => match ast.children.first() {
            Some(value) => Node::Return(boxed(value)?),
            None => Node::Return(Box::new(Node::Literal(Value::Nil))),
        },
        NodeKind::Break => Node::Break,
        NodeKind::Continue => Node::Continue,
        NodeKind::If => if_chain(ast)?,
        NodeKind::While => Node::While(
            boxed(child(ast, 0, "while without a condition")?)?,
            boxed(block(ast, 1)?)?,
        ),
        NodeKind::For => {
            let variable = child(ast, 0, "for without a loop variable")?;
            expect_kind(variable, NodeKind::Identifier)?;
            Node::For {
                variable: variable.text.clone(),
                iterable: boxed(child(ast, 1, "for without an iterable")?)?,
                body: boxed(block(ast, 2)?)?,
            }
        }
        NodeKind::FunctionDefinition => {
            let parameters = child(ast, 0, "function without parameters")?;
            expect_kind(parameters, NodeKind::ParameterList)?;
            let parameters = parameters
                .children
                .iter()
                .map(|parameter| {
                    expect_kind(parameter, NodeKind::Identifier)?;
                    Ok(parameter.text.clone())
                })
                .collect::<Result<Vec<_>, CompileError>>()?;
            Node::Function(Rc::new(FunctionDefinition {
                parameters,
                body: node(block(ast, 1)?)?,
            }))
        }
        NodeKind::BinaryOp => {
            let operator =
                BinaryOperator::from_symbol(&ast.text).ok_or_else(|| unknown_operator(ast))?;
            Node::Binary(
                boxed(child(ast, 0, "binary operator without a left operand")?)?,
                operator,
                boxed(child(ast, 1, "binary operator without a right operand")?)?,
            )
        }
        NodeKind::UnaryOp => {
            let operator =
                UnaryOperator::from_symbol(&ast.text).ok_or_else(|| unknown_operator(ast))?;
            Node::Unary(operator, boxed(child(ast, 0, "unary operator without operand")?)?)
        }
        NodeKind::Literal(LiteralKind::Number) => {
            let number = ast.text.parse::<f64>().map_err(|_| CompileError::InvalidNumber {
                text: ast.text.clone(),
                line: ast.line(),
            })?;
            Node::Literal(Value::Number(number))
        }
        NodeKind::Literal(LiteralKind::String) => Node::Literal(Value::String(ast.text.clone())),
        NodeKind::Boolean => Node::Literal(Value::Boolean(ast.text == "true")),
        NodeKind::Nil => Node::Literal(Value::Nil),
        NodeKind::Identifier => Node::Identifier(ast.text.clone()),
        NodeKind::ListLiteral => Node::List(nodes(&ast.children)?),
        NodeKind::Program
        | NodeKind::ElseIf
        | NodeKind::Else
        | NodeKind::ParameterList
        | NodeKind::ArgumentList => return Err(unsupported(ast)),
    };
    Ok(node)
}

fn if_chain(ast: &AstNode) -> Result<Node, CompileError> {
    let mut arms = vec![(
        node(child(ast, 0, "if without a condition")?)?,
        node(block(ast, 1)?)?,
    )];
    let mut otherwise = None;

    for clause in &ast.children[2..] {
        if otherwise.is_some() {
            return Err(malformed(ast, "clause after else"));
        }
        match clause.kind {
            NodeKind::ElseIf => arms.push((
                node(child(clause, 0, "elseif without a condition")?)?,
                node(block(clause, 1)?)?,
            )),
            NodeKind::Else => otherwise = Some(boxed(block(clause, 0)?)?),
            _ => return Err(unsupported(clause)),
        }
    }

    Ok(Node::If(arms, otherwise))
}

fn nodes(children: &[AstNode]) -> Result<Vec<Node>, CompileError> {
    children.iter().map(node).collect()
}

fn boxed(ast: &AstNode) -> Result<Box<Node>, CompileError> {
    node(ast).map(Box::new)
}

fn child<'a>(
    ast: &'a AstNode,
    index: usize,
    reason: &'static str,
) -> Result<&'a AstNode, CompileError> {
    ast.children.get(index).ok_or_else(|| malformed(ast, reason))
}

fn block(ast: &AstNode, index: usize) -> Result<&AstNode, CompileError> {
    let body = child(ast, index, "missing body")?;
    expect_kind(body, NodeKind::StatementList)?;
    Ok(body)
}

fn expect_kind(ast: &AstNode, kind: NodeKind) -> Result<(), CompileError> {
    if ast.kind == kind {
        Ok(())
    } else {
        Err(unsupported(ast))
    }
}

fn unsupported(ast: &AstNode) -> CompileError {
    CompileError::UnsupportedNode {
        kind: ast.kind,
        line: ast.line(),
    }
}

fn malformed(ast: &AstNode, reason: &'static str) -> CompileError {
    CompileError::MalformedNode {
        kind: ast.kind,
        line: ast.line(),
        reason,
    }
}

fn unknown_operator(ast: &AstNode) -> CompileError {
    CompileError::UnknownOperator {
        operator: ast.text.clone(),
        line: ast.line(),
    }
}
