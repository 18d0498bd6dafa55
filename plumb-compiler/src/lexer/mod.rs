use anyhow::Result;
use num_bigint::BigInt;
use thiserror::Error;

use crate::ast::AssignOperator;
use crate::source::SourceFile;

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, lexeme: String, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier,
    IntegerLiteral(BigInt),
    RationalLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    Keyword(Keyword),
    Newline,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Assign(AssignOperator),
    DoubleEqual,
    Bang,
    BangEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    /// `||`, delimits list types and list literals.
    PipePipe,
    /// `<<`
    MapOpen,
    /// `>>`
    MapClose,
    /// Any `-...>` spelling or `--<(` inside a `Pipelines` block.
    PipeOperator,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Import,
    Definitions,
    Pipelines,
    Func,
    Proto,
    Atr,
    If,
    While,
    For,
    Return,
    Break,
    Continue,
    And,
    Or,
    None,
    All,
    SelfValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct LexerError {
    message: String,
    line: usize,
    column: usize,
}

impl LexerError {
    fn new<S: Into<String>>(message: S, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    line: usize,
    column: usize,
    in_pipelines: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a SourceFile) -> Result<Self> {
        Ok(Self {
            input: &source.contents,
            position: 0,
            line: 1,
            column: 1,
            in_pipelines: false,
        })
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            match ch {
                ' ' | '\t' | '\r' => {
                    self.advance_char();
                }
                '\n' => {
                    let token = Token::new(
                        TokenKind::Newline,
                        "\n".to_string(),
                        self.line,
                        self.column,
                    );
                    self.advance_char();
                    tokens.push(token);
                }
                '"' => tokens.push(self.lex_string()?),
                '0'..='9' => tokens.push(self.lex_number()?),
                'a'..='z' | 'A'..='Z' | '_' => tokens.push(self.lex_identifier_or_keyword()),
                '(' => tokens.push(self.simple_token(TokenKind::LParen)),
                ')' => tokens.push(self.simple_token(TokenKind::RParen)),
                '{' => tokens.push(self.simple_token(TokenKind::LBrace)),
                '}' => tokens.push(self.simple_token(TokenKind::RBrace)),
                '[' => tokens.push(self.simple_token(TokenKind::LBracket)),
                ']' => tokens.push(self.simple_token(TokenKind::RBracket)),
                ',' => tokens.push(self.simple_token(TokenKind::Comma)),
                '.' => tokens.push(self.simple_token(TokenKind::Dot)),
                '+' => tokens.push(self.simple_token(TokenKind::Plus)),
                '*' => tokens.push(self.simple_token(TokenKind::Star)),
                '/' => tokens.push(self.simple_token(TokenKind::Slash)),
                '%' => tokens.push(self.simple_token(TokenKind::Percent)),
                '^' => tokens.push(self.simple_token(TokenKind::Caret)),
                ':' => {
                    if self.peek_next_char() == Some(':') {
                        self.skip_comment()?;
                    } else {
                        tokens.push(self.simple_token(TokenKind::Colon));
                    }
                }
                '=' => tokens.push(self.lex_equals_variants()?),
                '!' => tokens.push(self.lex_bang_variants()),
                '<' => tokens.push(self.lex_less_variants()),
                '>' => tokens.push(self.lex_greater_variants()),
                '|' => tokens.push(self.lex_pipe_variants()?),
                '-' => tokens.push(self.lex_minus_variants()),
                other => {
                    return Err(self.error(format!("Unexpected character '{other}'")));
                }
            }
        }

        tokens.push(Token::new(
            TokenKind::Eof,
            String::new(),
            self.line,
            self.column,
        ));

        Ok(tokens)
    }

    fn error<S: Into<String>>(&self, message: S) -> anyhow::Error {
        LexerError::new(message, self.line, self.column).into()
    }

    /// Skips a `:: ... ::` comment, which may span several lines.
    fn skip_comment(&mut self) -> Result<()> {
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char();
        self.advance_char();

        while let Some(ch) = self.peek_char() {
            if ch == ':' && self.peek_next_char() == Some(':') {
                self.advance_char();
                self.advance_char();
                return Ok(());
            }
            self.advance_char();
        }

        Err(LexerError::new("Unterminated comment", start_line, start_column).into())
    }

    fn lex_string(&mut self) -> Result<Token> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        self.advance_char(); // opening quote

        let mut value = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                '"' => {
                    self.advance_char();
                    return Ok(Token::new(
                        TokenKind::StringLiteral(value),
                        self.slice(start, self.position).to_string(),
                        start_line,
                        start_column,
                    ));
                }
                '\\' => {
                    self.advance_char();
                    let escaped = self.peek_char().ok_or_else(|| {
                        self.error("Unterminated escape sequence in string literal")
                    })?;
                    value.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                    self.advance_char();
                }
                '\n' => break,
                _ => {
                    value.push(ch);
                    self.advance_char();
                }
            }
        }

        Err(LexerError::new("Unterminated string literal", start_line, start_column).into())
    }

    fn lex_number(&mut self) -> Result<Token> {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;
        let mut is_rational = false;

        while let Some(ch) = self.peek_char() {
            match ch {
                '0'..='9' => {
                    self.advance_char();
                }
                '.' if !is_rational
                    && self
                        .peek_next_char()
                        .map(|next| next.is_ascii_digit())
                        .unwrap_or(false) =>
                {
                    is_rational = true;
                    self.advance_char();
                }
                _ => break,
            }
        }

        let lexeme = self.slice(start, self.position).to_string();
        let kind = if is_rational {
            let value = lexeme.parse::<f64>().map_err(|_| {
                LexerError::new(
                    format!("Failed to parse rational literal '{lexeme}'"),
                    start_line,
                    start_column,
                )
            })?;
            TokenKind::RationalLiteral(value)
        } else {
            let value = lexeme.parse::<BigInt>().map_err(|_| {
                LexerError::new(
                    format!("Failed to parse integer literal '{lexeme}'"),
                    start_line,
                    start_column,
                )
            })?;
            TokenKind::IntegerLiteral(value)
        };

        Ok(Token::new(kind, lexeme, start_line, start_column))
    }

    fn lex_identifier_or_keyword(&mut self) -> Token {
        let start = self.position;
        let start_line = self.line;
        let start_column = self.column;

        while let Some(ch) = self.peek_char() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let lexeme = self.slice(start, self.position).to_string();
        let kind = match lexeme.as_str() {
            "true" => TokenKind::BooleanLiteral(true),
            "false" => TokenKind::BooleanLiteral(false),
            other => match keyword_from_lexeme(other) {
                Some(keyword) => {
                    if keyword == Keyword::Pipelines {
                        self.in_pipelines = true;
                    }
                    TokenKind::Keyword(keyword)
                }
                None => TokenKind::Identifier,
            },
        };

        Token::new(kind, lexeme, start_line, start_column)
    }

    fn lex_equals_variants(&mut self) -> Result<Token> {
        if self.peek_next_char() == Some('=') {
            return Ok(self.multi_char_token(TokenKind::DoubleEqual, 2));
        }
        Err(self.error("Unexpected '=', assignments are written '<=='"))
    }

    fn lex_bang_variants(&mut self) -> Token {
        if self.peek_next_char() == Some('=') {
            self.multi_char_token(TokenKind::BangEqual, 2)
        } else {
            self.simple_token(TokenKind::Bang)
        }
    }

    fn lex_less_variants(&mut self) -> Token {
        let rest = &self.input[self.position..];
        let assignment = [
            ("<==", AssignOperator::Assign),
            ("<++", AssignOperator::AddAssign),
            ("<--", AssignOperator::SubtractAssign),
            ("<**", AssignOperator::MultiplyAssign),
            ("<//", AssignOperator::DivideAssign),
            ("<%%", AssignOperator::ModuloAssign),
            ("<^^", AssignOperator::PowerAssign),
        ]
        .into_iter()
        .find(|(spelling, _)| rest.starts_with(spelling));

        if let Some((_, operator)) = assignment {
            self.multi_char_token(TokenKind::Assign(operator), 3)
        } else if rest.starts_with("<<") {
            self.multi_char_token(TokenKind::MapOpen, 2)
        } else if rest.starts_with("<=") {
            self.multi_char_token(TokenKind::LessEqual, 2)
        } else {
            self.simple_token(TokenKind::Less)
        }
    }

    fn lex_greater_variants(&mut self) -> Token {
        match self.peek_next_char() {
            Some('>') => self.multi_char_token(TokenKind::MapClose, 2),
            Some('=') => self.multi_char_token(TokenKind::GreaterEqual, 2),
            _ => self.simple_token(TokenKind::Greater),
        }
    }

    fn lex_pipe_variants(&mut self) -> Result<Token> {
        if self.peek_next_char() == Some('|') {
            Ok(self.multi_char_token(TokenKind::PipePipe, 2))
        } else {
            Err(self.error("Unexpected '|', list delimiters are written '||'"))
        }
    }

    fn lex_minus_variants(&mut self) -> Token {
        if self.in_pipelines {
            if let Some(length) = self.pipe_operator_length() {
                return self.multi_char_token(TokenKind::PipeOperator, length);
            }
        }
        self.simple_token(TokenKind::Minus)
    }

    /// Length in bytes of a pipe operator starting at the current `-`.
    /// The spelling is validated later by the analyzer.
    fn pipe_operator_length(&self) -> Option<usize> {
        let rest = &self.input[self.position..];
        if rest.starts_with("--<(") {
            return Some(4);
        }
        for (offset, ch) in rest.char_indices().skip(1) {
            match ch {
                '>' => return Some(offset + 1),
                '-' | '(' | ')' | '_' => {}
                other if other.is_ascii_alphanumeric() => {}
                _ => return None,
            }
        }
        None
    }

    fn simple_token(&mut self, kind: TokenKind) -> Token {
        self.multi_char_token(kind, 1)
    }

    fn multi_char_token(&mut self, kind: TokenKind, length: usize) -> Token {
        let start_line = self.line;
        let start_column = self.column;
        let start = self.position;
        for _ in 0..length {
            self.advance_char();
        }
        Token::new(
            kind,
            self.slice(start, self.position).to_string(),
            start_line,
            start_column,
        )
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut iter = self.input[self.position..].chars();
        iter.next()?;
        iter.next()
    }

    fn advance_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.position += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn slice(&self, start: usize, end: usize) -> &str {
        &self.input[start..end]
    }
}

fn keyword_from_lexeme(lexeme: &str) -> Option<Keyword> {
    match lexeme {
        "import" => Some(Keyword::Import),
        "Definitions" => Some(Keyword::Definitions),
        "Pipelines" => Some(Keyword::Pipelines),
        "FUNC" => Some(Keyword::Func),
        "PROTO" => Some(Keyword::Proto),
        "ATR" => Some(Keyword::Atr),
        "if" => Some(Keyword::If),
        "while" => Some(Keyword::While),
        "for" => Some(Keyword::For),
        "return" => Some(Keyword::Return),
        "break" => Some(Keyword::Break),
        "continue" => Some(Keyword::Continue),
        "and" => Some(Keyword::And),
        "or" => Some(Keyword::Or),
        "none" => Some(Keyword::None),
        "all" => Some(Keyword::All),
        "self" => Some(Keyword::SelfValue),
        _ => None,
    }
}
