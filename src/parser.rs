use std::cell::RefCell;

use crate::{
    ast::{AstNode, LiteralKind, NodeKind},
    span::Span,
    tokenizer::{Token, TokenType},
};

#[derive(Debug)]
pub struct ParseErrorWithContext {
    pub error: ParseError,
    context: ParseContext,
    pub token: Option<Token>,
}

impl ParseErrorWithContext {
    pub fn line(&self) -> Option<usize> {
        self.token.as_ref().map(Token::line)
    }
}

impl std::error::Error for ParseErrorWithContext {}

impl std::fmt::Display for ParseErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "While parsing {}",
            self.context.stack.borrow().join(" > ")
        )?;
        write!(f, "{}", self.error)?;
        if let Some(token) = &self.token {
            write!(
                f,
                " at line {}, column {} but found \"{}\"",
                token.span.start_line, token.span.start_column, token
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Expected \"{0}\"")]
    Expected(TokenType),
    #[error("Expected one of {}", join(.0))]
    ExpectedOneOf(Vec<TokenType>),
    #[error("Unexpected \"{0}\"")]
    Unexpected(TokenType),
    #[error("Expected identifier")]
    ExpectedIdentifier,
    #[error("Expected a statement")]
    ExpectedStatement,
    #[error("Expected a function call")]
    ExpectedCall,
    #[error("Expected end of statement")]
    ExpectedEndOfStatement,
}

fn join(token_types: &[TokenType]) -> String {
    token_types
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone)]
struct ParseContext {
    stack: RefCell<Vec<&'static str>>,
}

impl ParseContext {
    fn new() -> Self {
        Self {
            stack: RefCell::new(Vec::new()),
        }
    }

    fn push(&self, name: &'static str) -> ParseContextGuard {
        self.stack.borrow_mut().push(name);
        ParseContextGuard::new(self)
    }

    fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    fn error(&self, error: ParseError, tokens: &[Token]) -> ParseErrorWithContext {
        ParseErrorWithContext {
            error,
            context: self.clone(),
            token: tokens.first().cloned(),
        }
    }
}

struct ParseContextGuard<'a> {
    context: &'a ParseContext,
}

impl<'a> ParseContextGuard<'a> {
    fn new(context: &'a ParseContext) -> Self {
        Self { context }
    }
}

impl<'a> Drop for ParseContextGuard<'a> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

type Parsed<'a> = Result<(AstNode, &'a [Token]), ParseErrorWithContext>;

/// Parses a whole token stream (as produced by [`crate::tokenizer::tokens`])
/// into a `Program` node holding a single `StatementList`.
pub fn program(tokens: &[Token]) -> Result<AstNode, ParseErrorWithContext> {
    let context = ParseContext::new();
    let _guard = context.push("program");

    let (statements, tokens) = statement_list(&context, tokens)?;
    consume(&context, tokens, TokenType::Eof)?;

    let program = AstNode::new(NodeKind::Program, statements.span.clone()).with_child(statements);
    log::debug!("parsed program");
    Ok(program)
}

fn peek(tokens: &[Token]) -> Option<&TokenType> {
    tokens.first().map(Token::token_type)
}

fn peek_second(tokens: &[Token]) -> Option<&TokenType> {
    tokens.get(1).map(Token::token_type)
}

fn span_of(tokens: &[Token]) -> Span {
    tokens.first().map(|t| t.span.clone()).unwrap_or_default()
}

fn skip_newlines(tokens: &[Token]) -> &[Token] {
    let count = tokens
        .iter()
        .take_while(|t| t.token_type == TokenType::NewLine)
        .count();
    &tokens[count..]
}

fn is_block_end(token_type: Option<&TokenType>) -> bool {
    matches!(
        token_type,
        None | Some(TokenType::End | TokenType::Else | TokenType::Eof)
    )
}

fn statement_list<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("statement_list");
    let mut tokens = skip_newlines(tokens);
    let mut list = AstNode::new(NodeKind::StatementList, span_of(tokens));

    while !is_block_end(peek(tokens)) {
        let (stmt, rest) = statement(context, tokens)?;
        list.span = list.span.clone() + stmt.span.clone();
        list.push(stmt);
        tokens = rest;

        match peek(tokens) {
            Some(TokenType::NewLine) => tokens = skip_newlines(tokens),
            token_type if is_block_end(token_type) => {}
            _ => return Err(context.error(ParseError::ExpectedEndOfStatement, tokens)),
        }
    }

    Ok((list, tokens))
}

fn statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("statement");
    match peek(tokens) {
        Some(TokenType::If) => if_statement(context, tokens),
        Some(TokenType::While) => while_statement(context, tokens),
        Some(TokenType::For) => for_statement(context, tokens),
        Some(TokenType::Return) => return_statement(context, tokens),
        Some(TokenType::Break) => Ok((
            AstNode::new(NodeKind::Break, span_of(tokens)),
            &tokens[1..],
        )),
        Some(TokenType::Continue) => Ok((
            AstNode::new(NodeKind::Continue, span_of(tokens)),
            &tokens[1..],
        )),
        Some(TokenType::Identifier) if peek_second(tokens).is_some_and(TokenType::is_assignment) => {
            assignment(context, tokens)
        }
        Some(TokenType::Identifier) => call_statement(context, tokens),
        _ => Err(context.error(ParseError::ExpectedStatement, tokens)),
    }
}

fn assignment<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("assignment");
    let (target, tokens) = identifier(context, tokens)?;
    let operator = &tokens[0];
    let (value, tokens) = expression(context, &tokens[1..])?;

    let node = AstNode::new(NodeKind::Assignment, target.span.clone() + value.span.clone())
        .with_text(operator.lexeme.clone())
        .with_child(target)
        .with_child(value);
    Ok((node, tokens))
}

fn call_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("call_statement");
    let (expr, rest) = call(context, tokens)?;
    if expr.kind != NodeKind::FunctionCall {
        return Err(context.error(ParseError::ExpectedCall, rest));
    }
    Ok((expr, rest))
}

fn return_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("return_statement");
    let span = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::Return)?;
    let (value, tokens) = expression(context, tokens)?;
    let node = AstNode::new(NodeKind::Return, span + value.span.clone()).with_child(value);
    Ok((node, tokens))
}

fn if_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("if_statement");
    let mut node = AstNode::new(NodeKind::If, span_of(tokens));

    let tokens = consume(context, tokens, TokenType::If)?;
    let (condition, tokens) = expression(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::Then)?;
    let (body, mut tokens) = statement_list(context, tokens)?;
    node.push(condition);
    node.push(body);

    while peek(tokens) == Some(&TokenType::Else) && peek_second(tokens) == Some(&TokenType::If) {
        let mut clause = AstNode::new(NodeKind::ElseIf, span_of(tokens));
        let (condition, rest) = expression(context, &tokens[2..])?;
        let rest = consume(context, rest, TokenType::Then)?;
        let (body, rest) = statement_list(context, rest)?;
        clause.span = clause.span.clone() + body.span.clone();
        clause.push(condition);
        clause.push(body);
        node.push(clause);
        tokens = rest;
    }

    if peek(tokens) == Some(&TokenType::Else) {
        let span = span_of(tokens);
        let (body, rest) = statement_list(context, &tokens[1..])?;
        node.push(AstNode::new(NodeKind::Else, span + body.span.clone()).with_child(body));
        tokens = rest;
    }

    let end = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::End)?;
    let tokens = consume(context, tokens, TokenType::If)?;
    node.span = node.span.clone() + end;
    Ok((node, tokens))
}

fn while_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("while_statement");
    let span = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::While)?;
    let (condition, tokens) = expression(context, tokens)?;
    let (body, tokens) = statement_list(context, tokens)?;
    let end = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::End)?;
    let tokens = consume(context, tokens, TokenType::While)?;

    let node = AstNode::new(NodeKind::While, span + end)
        .with_child(condition)
        .with_child(body);
    Ok((node, tokens))
}

fn for_statement<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("for_statement");
    let span = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::For)?;
    let (variable, tokens) = identifier(context, tokens)?;
    let tokens = consume(context, tokens, TokenType::In)?;
    let (iterable, tokens) = expression(context, tokens)?;
    let (body, tokens) = statement_list(context, tokens)?;
    let end = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::End)?;
    let tokens = consume(context, tokens, TokenType::For)?;

    let node = AstNode::new(NodeKind::For, span + end)
        .with_child(variable)
        .with_child(iterable)
        .with_child(body);
    Ok((node, tokens))
}

fn expression<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("expression");
    logical_or(context, tokens)
}

fn binary<'a>(
    context: &ParseContext,
    precedence: impl Fn(&ParseContext, &'a [Token]) -> Parsed<'a>,
    operator: impl Fn(&TokenType) -> bool,
    tokens: &'a [Token],
) -> Parsed<'a> {
    let (mut expr, mut tokens) = precedence(context, tokens)?;

    while let Some(token) = tokens.first() {
        if !operator(token.token_type()) {
            break;
        }
        let (right, rest) = precedence(context, &tokens[1..])?;
        expr = binary_node(token.lexeme.clone(), expr, right);
        tokens = rest;
    }

    Ok((expr, tokens))
}

fn binary_node(operator: String, left: AstNode, right: AstNode) -> AstNode {
    AstNode::new(NodeKind::BinaryOp, left.span.clone() + right.span.clone())
        .with_text(operator)
        .with_child(left)
        .with_child(right)
}

fn logical_or<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("logical_or");
    binary(
        context,
        logical_and,
        |token_type| *token_type == TokenType::Or,
        tokens,
    )
}

fn logical_and<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("logical_and");
    binary(
        context,
        logical_not,
        |token_type| *token_type == TokenType::And,
        tokens,
    )
}

fn logical_not<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("logical_not");
    if peek(tokens) != Some(&TokenType::Not) {
        return comparison(context, tokens);
    }

    let span = span_of(tokens);
    let (operand, rest) = logical_not(context, &tokens[1..])?;
    let node = AstNode::new(NodeKind::UnaryOp, span + operand.span.clone())
        .with_text("not")
        .with_child(operand);
    Ok((node, rest))
}

/// Comparisons do not chain: at most one comparison operator is consumed, so
/// `a < b < c` leaves `< c` behind for the caller to reject.
fn comparison<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("comparison");
    let (left, tokens) = additive(context, tokens)?;

    match tokens.first() {
        Some(token)
            if matches!(
                token.token_type,
                TokenType::EqualEqual
                    | TokenType::BangEqual
                    | TokenType::Less
                    | TokenType::LessEqual
                    | TokenType::Greater
                    | TokenType::GreaterEqual
            ) =>
        {
            let (right, rest) = additive(context, &tokens[1..])?;
            Ok((binary_node(token.lexeme.clone(), left, right), rest))
        }
        _ => Ok((left, tokens)),
    }
}

fn additive<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("additive");
    binary(
        context,
        multiplicative,
        |token_type| matches!(token_type, TokenType::Plus | TokenType::Minus),
        tokens,
    )
}

fn multiplicative<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("multiplicative");
    binary(
        context,
        exponent,
        |token_type| {
            matches!(
                token_type,
                TokenType::Star | TokenType::Slash | TokenType::Percent
            )
        },
        tokens,
    )
}

/// `^` is left-associative and binds looser than prefix `-`: `-2^2` is `(-2)^2`.
fn exponent<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("exponent");
    binary(
        context,
        unary,
        |token_type| *token_type == TokenType::Caret,
        tokens,
    )
}

fn unary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("unary");

    let Some(token) = tokens.first() else {
        return call(context, tokens);
    };
    if !matches!(token.token_type, TokenType::Plus | TokenType::Minus) {
        return call(context, tokens);
    }

    let (operand, rest) = unary(context, &tokens[1..])?;
    let node = AstNode::new(NodeKind::UnaryOp, token.span.clone() + operand.span.clone())
        .with_text(token.lexeme.clone())
        .with_child(operand);
    Ok((node, rest))
}

fn call<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("call");
    let (mut expr, mut tokens) = primary(context, tokens)?;

    loop {
        match peek(tokens) {
            Some(TokenType::LeftBracket) => {
                let (index, rest) = index_or_slice(context, &tokens[1..])?;
                let end = span_of(rest);
                tokens = consume(context, rest, TokenType::RightBracket)?;
                let span = expr.span.clone() + end;
                expr = binary_node("[]".to_string(), expr, index);
                expr.span = span;
            }
            Some(TokenType::LeftParen) => {
                let (args, rest) = arguments(context, tokens)?;
                let span = expr.span.clone() + args.span.clone();
                expr = AstNode::new(NodeKind::FunctionCall, span)
                    .with_text(expr.text.clone())
                    .with_child(expr)
                    .with_child(args);
                tokens = rest;
            }
            _ => break,
        }
    }

    Ok((expr, tokens))
}

fn arguments<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("arguments");
    let mut args = AstNode::new(NodeKind::ArgumentList, span_of(tokens));
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;

    if peek(tokens) == Some(&TokenType::RightParen) {
        args.span = args.span.clone() + span_of(tokens);
        return Ok((args, &tokens[1..]));
    }

    loop {
        let (arg, rest) = expression(context, tokens)?;
        args.push(arg);
        tokens = rest;
        match peek(tokens) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => {
                args.span = args.span.clone() + span_of(tokens);
                return Ok((args, &tokens[1..]));
            }
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
}

/// Parses what follows `[`: either a single index expression or a slice
/// `start:end` where either bound may be omitted. Omitted bounds become `Nil`.
fn index_or_slice<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("index_or_slice");

    let (start, tokens) = match peek(tokens) {
        Some(TokenType::Colon) => (AstNode::new(NodeKind::Nil, span_of(tokens)), tokens),
        _ => expression(context, tokens)?,
    };

    if peek(tokens) != Some(&TokenType::Colon) {
        return Ok((start, tokens));
    }

    let colon = &tokens[0];
    let tokens = &tokens[1..];
    let (end, tokens) = match peek(tokens) {
        Some(TokenType::RightBracket) => (AstNode::new(NodeKind::Nil, span_of(tokens)), tokens),
        _ => expression(context, tokens)?,
    };

    Ok((binary_node(colon.lexeme.clone(), start, end), tokens))
}

fn primary<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("primary");
    let Some(token) = tokens.first() else {
        return Err(context.error(ParseError::Unexpected(TokenType::Eof), tokens));
    };

    let span = token.span.clone();
    match token.token_type() {
        TokenType::Number => Ok((
            AstNode::new(NodeKind::Literal(LiteralKind::Number), span).with_text(&token.lexeme),
            &tokens[1..],
        )),
        TokenType::String => Ok((
            AstNode::new(NodeKind::Literal(LiteralKind::String), span).with_text(&token.lexeme),
            &tokens[1..],
        )),
        TokenType::Boolean => Ok((
            AstNode::new(NodeKind::Boolean, span).with_text(&token.lexeme),
            &tokens[1..],
        )),
        TokenType::Nil => Ok((AstNode::new(NodeKind::Nil, span), &tokens[1..])),
        TokenType::Identifier => identifier(context, tokens),
        TokenType::LeftParen => {
            let (expr, rest) = expression(context, &tokens[1..])?;
            let tokens = consume(context, rest, TokenType::RightParen)?;
            Ok((expr, tokens))
        }
        TokenType::LeftBracket => list_literal(context, tokens),
        TokenType::Function => function_literal(context, tokens),
        token_type => Err(context.error(ParseError::Unexpected(*token_type), tokens)),
    }
}

fn list_literal<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("list_literal");
    let mut list = AstNode::new(NodeKind::ListLiteral, span_of(tokens));
    let mut tokens = consume(context, tokens, TokenType::LeftBracket)?;

    loop {
        tokens = skip_newlines(tokens);
        if peek(tokens) == Some(&TokenType::RightBracket) {
            break;
        }

        let (element, rest) = expression(context, tokens)?;
        list.push(element);
        tokens = skip_newlines(rest);

        match peek(tokens) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            _ => break,
        }
    }

    list.span = list.span.clone() + span_of(tokens);
    let tokens = consume(context, tokens, TokenType::RightBracket)?;
    Ok((list, tokens))
}

fn function_literal<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("function_literal");
    let span = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::Function)?;
    let (parameters, tokens) = parameters(context, tokens)?;
    let (body, tokens) = statement_list(context, tokens)?;
    let end = span_of(tokens);
    let tokens = consume(context, tokens, TokenType::End)?;
    let tokens = consume(context, tokens, TokenType::Function)?;

    let node = AstNode::new(NodeKind::FunctionDefinition, span + end)
        .with_child(parameters)
        .with_child(body);
    Ok((node, tokens))
}

fn parameters<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    let _guard = context.push("parameters");
    let mut parameters = AstNode::new(NodeKind::ParameterList, span_of(tokens));
    let mut tokens = consume(context, tokens, TokenType::LeftParen)?;

    if peek(tokens) == Some(&TokenType::RightParen) {
        return Ok((parameters, &tokens[1..]));
    }

    loop {
        let (name, rest) = identifier(context, tokens)?;
        parameters.push(name);
        tokens = rest;

        match peek(tokens) {
            Some(TokenType::Comma) => tokens = &tokens[1..],
            Some(TokenType::RightParen) => return Ok((parameters, &tokens[1..])),
            _ => {
                return Err(context.error(
                    ParseError::ExpectedOneOf(vec![TokenType::Comma, TokenType::RightParen]),
                    tokens,
                ))
            }
        }
    }
}

fn consume<'a>(
    context: &ParseContext,
    tokens: &'a [Token],
    token_type: TokenType,
) -> Result<&'a [Token], ParseErrorWithContext> {
    match peek(tokens) {
        Some(t) if t == &token_type => Ok(&tokens[1..]),
        _ => Err(context.error(ParseError::Expected(token_type), tokens)),
    }
}

fn identifier<'a>(context: &ParseContext, tokens: &'a [Token]) -> Parsed<'a> {
    match tokens.first() {
        Some(token) if token.token_type == TokenType::Identifier => Ok((
            AstNode::new(NodeKind::Identifier, token.span.clone()).with_text(&token.lexeme),
            &tokens[1..],
        )),
        _ => Err(context.error(ParseError::ExpectedIdentifier, tokens)),
    }
}
