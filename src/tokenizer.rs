use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Colon,
    NewLine,

    // Operators, possibly followed by '='
    Plus,
    PlusEqual,
    Minus,
    MinusEqual,
    Star,
    StarEqual,
    Slash,
    SlashEqual,
    Percent,
    PercentEqual,
    Caret,
    CaretEqual,
    Equal,
    EqualEqual,
    BangEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Literals
    Identifier,
    String,
    Number,
    Boolean,
    Nil,

    // Keywords
    If,
    Then,
    Else,
    End,
    While,
    For,
    In,
    Function,
    Return,
    Break,
    Continue,
    And,
    Or,
    Not,

    // End of file
    Eof,
}

impl TokenType {
    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenType::Equal
                | TokenType::PlusEqual
                | TokenType::MinusEqual
                | TokenType::StarEqual
                | TokenType::SlashEqual
                | TokenType::PercentEqual
                | TokenType::CaretEqual
        )
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            TokenType::LeftParen => "(",
            TokenType::RightParen => ")",
            TokenType::LeftBracket => "[",
            TokenType::RightBracket => "]",
            TokenType::Comma => ",",
            TokenType::Colon => ":",
            TokenType::NewLine => "newline",
            TokenType::Plus => "+",
            TokenType::PlusEqual => "+=",
            TokenType::Minus => "-",
            TokenType::MinusEqual => "-=",
            TokenType::Star => "*",
            TokenType::StarEqual => "*=",
            TokenType::Slash => "/",
            TokenType::SlashEqual => "/=",
            TokenType::Percent => "%",
            TokenType::PercentEqual => "%=",
            TokenType::Caret => "^",
            TokenType::CaretEqual => "^=",
            TokenType::Equal => "=",
            TokenType::EqualEqual => "==",
            TokenType::BangEqual => "!=",
            TokenType::Less => "<",
            TokenType::LessEqual => "<=",
            TokenType::Greater => ">",
            TokenType::GreaterEqual => ">=",
            TokenType::Identifier => "identifier",
            TokenType::String => "string",
            TokenType::Number => "number",
            TokenType::Boolean => "boolean",
            TokenType::Nil => "nil",
            TokenType::If => "if",
            TokenType::Then => "then",
            TokenType::Else => "else",
            TokenType::End => "end",
            TokenType::While => "while",
            TokenType::For => "for",
            TokenType::In => "in",
            TokenType::Function => "function",
            TokenType::Return => "return",
            TokenType::Break => "break",
            TokenType::Continue => "continue",
            TokenType::And => "and",
            TokenType::Or => "or",
            TokenType::Not => "not",
            TokenType::Eof => "end of input",
        };
        write!(f, "{text}")
    }
}

/// A lexed token. For strings `lexeme` holds the unescaped contents, for
/// everything else the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    pub fn line(&self) -> usize {
        self.span.start_line
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.token_type {
            TokenType::NewLine | TokenType::Eof => write!(f, "{}", self.token_type),
            TokenType::String => write!(f, "\"{}\"", self.lexeme.escape_default()),
            _ => write!(f, "{}", self.lexeme),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{error} at line {line}, column {column}")]
pub struct TokenizeError {
    pub error: TokenError,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Unexpected character '{0}'")]
    UnexpectedCharacter(char),
    #[error("Unterminated string")]
    UnterminatedString,
}

#[derive(Debug, Clone, Copy)]
struct Position {
    line: usize,
    column: usize,
}

impl Position {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut position = Position { line: 1, column: 1 };

    loop {
        while let Some((_, rest)) = maximal(&[whitespace, comment], remaining) {
            position.advance(&remaining[..remaining.len() - rest.len()]);
            remaining = rest;
        }

        let start = position;
        let ((token_type, lexeme), rest) =
            token(remaining).map_err(|error| TokenizeError {
                error,
                line: start.line,
                column: start.column,
            })?;
        position.advance(&remaining[..remaining.len() - rest.len()]);
        remaining = rest;

        tokens.push(Token {
            token_type,
            lexeme,
            span: Span::new(start.line, start.column, position.line, position.column),
        });

        if token_type == TokenType::Eof {
            break;
        }
    }

    log::debug!("tokenized {} tokens", tokens.len());

    Ok(tokens)
}

pub type Lexeme = (TokenType, String);

/// Lexes one token from the start of `source`, which must already be free of
/// leading whitespace and comments.
pub fn token(source: &str) -> Result<(Lexeme, &str), TokenError> {
    let Some(first) = source.chars().next() else {
        return Ok(((TokenType::Eof, String::new()), source));
    };

    if first == '"' {
        return string(source).ok_or(TokenError::UnterminatedString);
    }

    maximal(
        &[
            // Single-character tokens
            left_paren,
            right_paren,
            left_bracket,
            right_bracket,
            comma,
            colon,
            newline,
            // one or two character tokens
            plus,
            plus_equal,
            minus,
            minus_equal,
            star,
            star_equal,
            slash,
            slash_equal,
            percent,
            percent_equal,
            caret,
            caret_equal,
            equal,
            equal_equal,
            bang_equal,
            less,
            less_equal,
            greater,
            greater_equal,
            // keywords
            if_,
            then,
            else_,
            end,
            while_,
            for_,
            in_,
            function,
            return_,
            break_,
            continue_,
            and,
            or,
            not,
            true_,
            false_,
            nil,
            // literals
            identifier,
            number,
        ],
        source,
    )
    .ok_or(TokenError::UnexpectedCharacter(first))
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace() && *c != '\n')
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with("//") {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $token:expr) => {
        fn $name(source: &str) -> Option<(Lexeme, &str)> {
            if source.starts_with($word) {
                Some((($token, $word.to_string()), &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenType::LeftParen }
match_literal! { right_paren, ")", TokenType::RightParen }
match_literal! { left_bracket, "[", TokenType::LeftBracket }
match_literal! { right_bracket, "]", TokenType::RightBracket }
match_literal! { comma, ",", TokenType::Comma }
match_literal! { colon, ":", TokenType::Colon }
match_literal! { newline, "\n", TokenType::NewLine }
match_literal! { plus, "+", TokenType::Plus }
match_literal! { plus_equal, "+=", TokenType::PlusEqual }
match_literal! { minus, "-", TokenType::Minus }
match_literal! { minus_equal, "-=", TokenType::MinusEqual }
match_literal! { star, "*", TokenType::Star }
match_literal! { star_equal, "*=", TokenType::StarEqual }
match_literal! { slash, "/", TokenType::Slash }
match_literal! { slash_equal, "/=", TokenType::SlashEqual }
match_literal! { percent, "%", TokenType::Percent }
match_literal! { percent_equal, "%=", TokenType::PercentEqual }
match_literal! { caret, "^", TokenType::Caret }
match_literal! { caret_equal, "^=", TokenType::CaretEqual }
match_literal! { equal, "=", TokenType::Equal }
match_literal! { equal_equal, "==", TokenType::EqualEqual }
match_literal! { bang_equal, "!=", TokenType::BangEqual }
match_literal! { less, "<", TokenType::Less }
match_literal! { less_equal, "<=", TokenType::LessEqual }
match_literal! { greater, ">", TokenType::Greater }
match_literal! { greater_equal, ">=", TokenType::GreaterEqual }
match_literal! { if_, "if", TokenType::If }
match_literal! { then, "then", TokenType::Then }
match_literal! { else_, "else", TokenType::Else }
match_literal! { end, "end", TokenType::End }
match_literal! { while_, "while", TokenType::While }
match_literal! { for_, "for", TokenType::For }
match_literal! { in_, "in", TokenType::In }
match_literal! { function, "function", TokenType::Function }
match_literal! { return_, "return", TokenType::Return }
match_literal! { break_, "break", TokenType::Break }
match_literal! { continue_, "continue", TokenType::Continue }
match_literal! { and, "and", TokenType::And }
match_literal! { or, "or", TokenType::Or }
match_literal! { not, "not", TokenType::Not }
match_literal! { true_, "true", TokenType::Boolean }
match_literal! { false_, "false", TokenType::Boolean }
match_literal! { nil, "nil", TokenType::Nil }

fn identifier(source: &str) -> Option<(Lexeme, &str)> {
    let mut chars = source.chars();

    let first = chars.next()?;
    if !first.is_ascii_alphabetic() && first != '_' {
        return None;
    }

    let len = first.len_utf8()
        + chars
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum::<usize>();

    Some((
        (TokenType::Identifier, source[..len].to_string()),
        &source[len..],
    ))
}

fn string(source: &str) -> Option<(Lexeme, &str)> {
    if !source.starts_with('"') {
        return None;
    }

    let mut value = String::new();
    let mut chars = source.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some(((TokenType::String, value), &source[i + 1..])),
            '\\' => {
                let (_, escaped) = chars.next()?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
            }
            c => value.push(c),
        }
    }
    None
}

fn number(source: &str) -> Option<(Lexeme, &str)> {
    let bytes = source.as_bytes();
    let digits = |from: usize| {
        bytes
            .get(from..)
            .map_or(0, |rest| rest.iter().take_while(|b| b.is_ascii_digit()).count())
    };

    let mut len = digits(0);
    if len == 0 {
        return None;
    }

    if bytes.get(len) == Some(&b'.') {
        len += 1;
        len += digits(len);
    }

    if matches!(bytes.get(len), Some(b'e' | b'E')) {
        let mut exponent = len + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let exponent_digits = digits(exponent);
        if exponent_digits > 0 {
            len = exponent + exponent_digits;
        }
    }

    Some((
        (TokenType::Number, source[..len].to_string()),
        &source[len..],
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        tokens(source)
            .unwrap()
            .into_iter()
            .map(|t| t.token_type)
            .collect()
    }

    #[test]
    fn test_tokens() {
        let source = "x = 1";
        let expected = vec![
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_tokens_with_comments() {
        let source = "x = 1 // comment\ny";
        let expected = vec![
            TokenType::Identifier,
            TokenType::Equal,
            TokenType::Number,
            TokenType::NewLine,
            TokenType::Identifier,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_newline_is_a_token() {
        let source = "a\n\n  b";
        let expected = vec![
            TokenType::Identifier,
            TokenType::NewLine,
            TokenType::NewLine,
            TokenType::Identifier,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_tokens_with_string() {
        let tokens = tokens(r#"s = "a\tb\"c\q""#).unwrap();
        assert_eq!(tokens[2].token_type, TokenType::String);
        assert_eq!(tokens[2].lexeme, "a\tb\"cq");
    }

    #[test]
    fn test_tokens_with_number() {
        let tokens = tokens("1 2.5 3e2 4.0E-1 5e").unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert_eq!(lexemes, vec!["1", "2.5", "3e2", "4.0E-1", "5", "e", ""]);
    }

    #[test]
    fn test_keywords_and_identifiers() {
        let source = "if iffy then end endless not nothing true";
        let expected = vec![
            TokenType::If,
            TokenType::Identifier,
            TokenType::Then,
            TokenType::End,
            TokenType::Identifier,
            TokenType::Not,
            TokenType::Identifier,
            TokenType::Boolean,
            TokenType::Eof,
        ];
        assert_eq!(types(source), expected);
    }

    #[test]
    fn test_compound_operators() {
        let source = "a+=b-=c*=d/=e%=f^=g==h!=i<=j>=k";
        let operators: Vec<_> = types(source)
            .into_iter()
            .filter(|t| *t != TokenType::Identifier)
            .collect();
        assert_eq!(
            operators,
            vec![
                TokenType::PlusEqual,
                TokenType::MinusEqual,
                TokenType::StarEqual,
                TokenType::SlashEqual,
                TokenType::PercentEqual,
                TokenType::CaretEqual,
                TokenType::EqualEqual,
                TokenType::BangEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn test_positions() {
        let tokens = tokens("a\n  bc = 1").unwrap();
        assert_eq!(tokens[0].span, Span::new(1, 1, 1, 2));
        assert_eq!(tokens[1].span, Span::new(1, 2, 2, 1));
        assert_eq!(tokens[2].span, Span::new(2, 3, 2, 5));
        assert_eq!(tokens[4].line(), 2);
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokens("x = 1\ny = @").unwrap_err();
        assert_eq!(err.error, TokenError::UnexpectedCharacter('@'));
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_lone_bang_is_rejected() {
        let err = tokens("not !x").unwrap_err();
        assert_eq!(err.error, TokenError::UnexpectedCharacter('!'));
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokens("x = 1\ns = \"abc").unwrap_err();
        assert_eq!(err.error, TokenError::UnterminatedString);
        assert_eq!(err.line, 2);
    }
}
