use anyhow::{bail, Result};

use crate::ast::*;
use crate::diagnostics::Diagnostics;
use crate::lexer::{Keyword, Token, TokenKind};
use crate::source::SourceFile;

#[derive(Copy, Clone, PartialEq, PartialOrd)]
enum Precedence {
    Lowest = 0,
    Or,
    And,
    Equality,
    Comparison,
    Term,
    Factor,
    Power,
    Unary,
}

impl Precedence {
    fn of(kind: &TokenKind) -> Option<Self> {
        match kind {
            TokenKind::Keyword(Keyword::Or) => Some(Precedence::Or),
            TokenKind::Keyword(Keyword::And) => Some(Precedence::And),
            TokenKind::DoubleEqual | TokenKind::BangEqual => Some(Precedence::Equality),
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual => Some(Precedence::Comparison),
            TokenKind::Plus | TokenKind::Minus => Some(Precedence::Term),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(Precedence::Factor),
            TokenKind::Caret => Some(Precedence::Power),
            _ => None,
        }
    }
}

pub struct Parser<'a> {
    _source: &'a SourceFile,
    tokens: Vec<Token>,
    current: usize,
    diagnostics: Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a SourceFile, tokens: Vec<Token>) -> Self {
        Self {
            _source: source,
            tokens,
            current: 0,
            diagnostics: Diagnostics::new(),
        }
    }

    fn span_from_token(token: &Token) -> SourceSpan {
        let len = token.lexeme.chars().count().max(1);
        SourceSpan::new(
            token.line,
            token.column,
            token.line,
            token.column + len.saturating_sub(1),
        )
    }

    fn union_spans(a: &SourceSpan, b: &SourceSpan) -> SourceSpan {
        SourceSpan::union(a, b)
    }

    pub fn parse(&mut self) -> Result<Program> {
        let mut program = Program::default();

        self.skip_newlines();
        while self.check_keyword(Keyword::Import) {
            program.imports.push(self.parse_import()?);
            self.skip_newlines();
        }

        if self.check_keyword(Keyword::Definitions) {
            let token = self.advance().clone();
            let (block, block_span) = self.parse_braced_block()?;
            program.definitions = Some(Definitions {
                block,
                span: Self::union_spans(&Self::span_from_token(&token), &block_span),
            });
            self.skip_newlines();
        }

        if self.check_keyword(Keyword::Pipelines) {
            program.pipelines = Some(self.parse_pipelines()?);
            self.skip_newlines();
        }

        if !self.is_at_end() {
            let token = self.peek().clone();
            return self.fail(
                format!(
                    "expected 'Definitions' or 'Pipelines' block, found '{}'",
                    token.lexeme
                ),
                Self::span_from_token(&token),
            );
        }

        Ok(program)
    }

    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }

    fn fail<T>(&mut self, message: String, span: SourceSpan) -> Result<T> {
        self.diagnostics
            .push_error_with_span(message.clone(), Some(span));
        bail!("{} at line {}, column {}", message, span.line, span.column)
    }

    fn parse_import(&mut self) -> Result<ImportDec> {
        let import_token = self.advance().clone();
        let path_token = self.peek().clone();
        let path = match &path_token.kind {
            TokenKind::StringLiteral(value) => value.clone(),
            _ => {
                return self.fail(
                    format!(
                        "expected module path string after 'import', found '{}'",
                        path_token.lexeme
                    ),
                    Self::span_from_token(&path_token),
                )
            }
        };
        self.advance();
        self.expect_statement_end("expected newline after import")?;
        Ok(ImportDec {
            path,
            span: Self::union_spans(
                &Self::span_from_token(&import_token),
                &Self::span_from_token(&path_token),
            ),
        })
    }

    fn parse_braced_block(&mut self) -> Result<(Block, SourceSpan)> {
        let open_token = self.peek().clone();
        self.expect_token(TokenKind::LBrace, "expected '{' to open block")?;
        let mut statements = Vec::new();

        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBrace) {
                break;
            }
            if self.is_at_end() {
                return self.fail(
                    "expected '}' to close block".to_string(),
                    Self::span_from_token(&open_token),
                );
            }
            statements.push(self.parse_statement()?);
            self.expect_statement_end("expected newline after statement")?;
        }

        let close_token = self.advance().clone();
        let span = Self::union_spans(
            &Self::span_from_token(&open_token),
            &Self::span_from_token(&close_token),
        );
        Ok((Block::new(statements), span))
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        match self.peek_kind() {
            TokenKind::Keyword(Keyword::Proto) => self.parse_prototype(),
            TokenKind::Keyword(Keyword::Atr) => self.parse_member(),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            TokenKind::Keyword(Keyword::While) => self.parse_while(),
            TokenKind::Keyword(Keyword::For) => self.parse_for(),
            TokenKind::Keyword(Keyword::Return) => self.parse_return(),
            TokenKind::Keyword(Keyword::Break) => {
                let token = self.advance().clone();
                Ok(Statement::Break(Self::span_from_token(&token)))
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let token = self.advance().clone();
                Ok(Statement::Continue(Self::span_from_token(&token)))
            }
            _ => self.parse_simple_statement(terminator_statement),
        }
    }

    /// Declarations, assignments and expression statements; the forms that may
    /// also appear in a `for` header.
    fn parse_simple_statement(&mut self, terminator: fn(&TokenKind) -> bool) -> Result<Statement> {
        match self.peek_kind() {
            TokenKind::PipePipe | TokenKind::MapOpen => {
                let annotation = self.parse_type_annotation()?;
                if self.check_keyword(Keyword::Func) {
                    return self.parse_function(annotation);
                }
                self.parse_container_declaration(annotation, terminator)
            }
            TokenKind::Identifier => match self.peek_kind_at(1) {
                Some(TokenKind::Identifier) => {
                    let annotation = self.parse_type_annotation()?;
                    self.parse_variable(annotation, terminator)
                }
                Some(TokenKind::Keyword(Keyword::Func)) => {
                    let annotation = self.parse_type_annotation()?;
                    self.parse_function(annotation)
                }
                Some(TokenKind::Assign(_)) => self.parse_assignment(false, terminator),
                _ => self.parse_expression_statement(terminator),
            },
            TokenKind::Keyword(Keyword::SelfValue)
                if matches!(self.peek_kind_at(1), Some(TokenKind::Dot))
                    && matches!(self.peek_kind_at(3), Some(TokenKind::Assign(_))) =>
            {
                self.advance(); // self
                self.advance(); // '.'
                self.parse_assignment(true, terminator)
            }
            _ => self.parse_expression_statement(terminator),
        }
    }

    fn parse_type_annotation(&mut self) -> Result<TypeAnnotation> {
        let token = self.advance().clone();
        let open_span = Self::span_from_token(&token);
        match token.kind {
            TokenKind::Identifier => Ok(TypeAnnotation::Named(Identifier::new(
                token.lexeme,
                open_span,
            ))),
            TokenKind::PipePipe => {
                let inner = self.parse_type_annotation()?;
                let close = self.peek().clone();
                self.expect_token(TokenKind::PipePipe, "expected '||' to close list type")?;
                let span = Self::union_spans(&open_span, &Self::span_from_token(&close));
                Ok(TypeAnnotation::List(Box::new(inner), span))
            }
            TokenKind::MapOpen => {
                let inner = self.parse_type_annotation()?;
                let close = self.peek().clone();
                self.expect_token(TokenKind::MapClose, "expected '>>' to close map type")?;
                let span = Self::union_spans(&open_span, &Self::span_from_token(&close));
                Ok(TypeAnnotation::Map(Box::new(inner), span))
            }
            _ => self.fail(
                format!("expected a type, found '{}'", token.lexeme),
                open_span,
            ),
        }
    }

    fn parse_identifier(&mut self, message: &str) -> Result<Identifier> {
        let token = self.peek().clone();
        if token.kind != TokenKind::Identifier {
            return self.fail(
                format!("{} (found '{}')", message, token.lexeme),
                Self::span_from_token(&token),
            );
        }
        self.advance();
        Ok(Identifier::new(token.lexeme.clone(), Self::span_from_token(&token)))
    }

    fn expect_plain_assign(&mut self) -> Result<()> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Assign(AssignOperator::Assign) {
            self.advance();
            Ok(())
        } else {
            self.fail(
                format!("expected '<==' in declaration (found '{}')", token.lexeme),
                Self::span_from_token(&token),
            )
        }
    }

    fn parse_variable(
        &mut self,
        ty: TypeAnnotation,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Statement> {
        let name = self.parse_identifier("expected variable name")?;
        self.expect_plain_assign()?;
        let value = self.parse_expression_with(terminator)?;
        Ok(Statement::Variable(VariableDec { ty, name, value }))
    }

    fn parse_container_declaration(
        &mut self,
        annotation: TypeAnnotation,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Statement> {
        let name = self.parse_identifier("expected variable name")?;
        self.expect_plain_assign()?;
        let value = self.parse_expression_with(terminator)?;
        match annotation {
            TypeAnnotation::List(element, _) => Ok(Statement::List(ListDec {
                element: *element,
                name,
                value,
            })),
            TypeAnnotation::Map(element, _) => Ok(Statement::Map(MapDec {
                element: *element,
                name,
                value,
            })),
            TypeAnnotation::Named(identifier) => Ok(Statement::Variable(VariableDec {
                ty: TypeAnnotation::Named(identifier),
                name,
                value,
            })),
        }
    }

    fn parse_assignment(
        &mut self,
        is_self: bool,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Statement> {
        let target = self.parse_identifier("expected assignment target")?;
        let operator_token = self.advance().clone();
        let operator = match operator_token.kind {
            TokenKind::Assign(operator) => operator,
            _ => {
                return self.fail(
                    format!(
                        "expected assignment operator, found '{}'",
                        operator_token.lexeme
                    ),
                    Self::span_from_token(&operator_token),
                )
            }
        };
        let value = self.parse_expression_with(terminator)?;
        let span = Self::union_spans(&target.span, &value.span);
        Ok(Statement::Assignment(Assignment {
            is_self,
            target,
            operator,
            value,
            span,
        }))
    }

    fn parse_parameters(&mut self) -> Result<Vec<TypeParameterPairDec>> {
        self.expect_token(TokenKind::LParen, "expected '(' to start parameter list")?;
        let mut parameters = Vec::new();
        self.skip_newlines();
        if matches!(self.peek_kind(), TokenKind::RParen) {
            self.advance();
            return Ok(parameters);
        }

        loop {
            self.skip_newlines();
            let ty = self.parse_type_annotation()?;
            let name = self.parse_identifier("expected parameter name")?;
            parameters.push(TypeParameterPairDec { ty, name });
            self.skip_newlines();
            match self.peek_kind() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    return Ok(parameters);
                }
                _ => {
                    let token = self.peek().clone();
                    return self.fail(
                        format!(
                            "expected ',' or ')' in parameter list, found '{}'",
                            token.lexeme
                        ),
                        Self::span_from_token(&token),
                    );
                }
            }
        }
    }

    fn parse_function(&mut self, return_type: TypeAnnotation) -> Result<Statement> {
        self.expect_keyword(Keyword::Func, "expected 'FUNC'")?;
        let name = self.parse_identifier("expected function name")?;
        let parameters = self.parse_parameters()?;
        let (body, _) = self.parse_braced_block()?;
        Ok(Statement::Function(FunctionDec {
            return_type,
            name,
            parameters,
            body,
            is_constructor: false,
        }))
    }

    fn parse_prototype(&mut self) -> Result<Statement> {
        self.advance(); // PROTO
        let name = self.parse_identifier("expected prototype name after 'PROTO'")?;
        let (body, _) = self.parse_braced_block()?;
        Ok(Statement::Prototype(PrototypeDec { name, body }))
    }

    /// `ATR T name [<== value]` or `ATR T FUNC name(...) { ... }`.
    fn parse_member(&mut self) -> Result<Statement> {
        self.advance(); // ATR
        let ty = self.parse_type_annotation()?;
        if self.check_keyword(Keyword::Func) {
            self.advance();
            let name = self.parse_identifier("expected method name")?;
            let parameters = self.parse_parameters()?;
            let (body, _) = self.parse_braced_block()?;
            return Ok(Statement::Method(MethodDec {
                return_type: ty,
                name,
                parameters,
                body,
            }));
        }

        let name = self.parse_identifier("expected attribute name")?;
        let value = if matches!(self.peek_kind(), TokenKind::Assign(_)) {
            self.expect_plain_assign()?;
            Some(self.parse_expression_with(terminator_statement)?)
        } else {
            None
        };
        Ok(Statement::Attribute(AttributeDec { ty, name, value }))
    }

    fn parse_condition(&mut self) -> Result<Expression> {
        self.expect_token(TokenKind::LParen, "expected '(' before condition")?;
        let condition = self.parse_expression_with(terminator_rparen)?;
        self.expect_token(TokenKind::RParen, "expected ')' after condition")?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Statement> {
        self.advance(); // if
        let condition = self.parse_condition()?;
        let (body, _) = self.parse_braced_block()?;
        Ok(Statement::If(IfStatement { condition, body }))
    }

    fn parse_while(&mut self) -> Result<Statement> {
        self.advance(); // while
        let condition = self.parse_condition()?;
        let (body, _) = self.parse_braced_block()?;
        Ok(Statement::While(WhileStatement { condition, body }))
    }

    fn parse_for(&mut self) -> Result<Statement> {
        let for_token = self.advance().clone();
        self.expect_token(TokenKind::LParen, "expected '(' after 'for'")?;
        self.skip_newlines();
        let initializer = self.parse_simple_statement(terminator_colon)?;
        self.expect_token(TokenKind::Colon, "expected ':' after for-loop initializer")?;
        let condition = self.parse_expression_with(terminator_colon)?;
        self.expect_token(TokenKind::Colon, "expected ':' after for-loop condition")?;
        self.skip_newlines();
        let step = self.parse_simple_statement(terminator_rparen)?;
        let close = self.peek().clone();
        self.expect_token(TokenKind::RParen, "expected ')' to close for-loop header")?;
        let span = Self::union_spans(
            &Self::span_from_token(&for_token),
            &Self::span_from_token(&close),
        );
        let (body, _) = self.parse_braced_block()?;
        Ok(Statement::For(ForStatement {
            initializer: Box::new(initializer),
            condition,
            step: Box::new(step),
            body,
            span,
        }))
    }

    fn parse_return(&mut self) -> Result<Statement> {
        let return_token = self.advance().clone();
        let span = Self::span_from_token(&return_token);
        if terminator_statement(self.peek_kind()) {
            return Ok(Statement::Return(ReturnStatement { value: None, span }));
        }
        let value = self.parse_expression_with(terminator_statement)?;
        let span = Self::union_spans(&span, &value.span);
        Ok(Statement::Return(ReturnStatement {
            value: Some(value),
            span,
        }))
    }

    fn parse_expression_statement(
        &mut self,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Statement> {
        let expression = self.parse_expression_with(terminator)?;
        Ok(Statement::Expression(ExpressionStatement { expression }))
    }

    fn parse_pipelines(&mut self) -> Result<Pipelines> {
        let keyword = self.advance().clone();
        let open = self.peek().clone();
        self.expect_token(TokenKind::LBrace, "expected '{' after 'Pipelines'")?;
        let mut pipes = Vec::new();

        loop {
            self.skip_newlines();
            if matches!(self.peek_kind(), TokenKind::RBrace) {
                break;
            }
            if self.is_at_end() {
                return self.fail(
                    "expected '}' to close Pipelines block".to_string(),
                    Self::span_from_token(&open),
                );
            }
            let inputs = self.parse_pipe_inputs()?;
            pipes.push(self.parse_pipe_from(inputs)?);
            self.expect_statement_end("expected newline after pipe")?;
        }

        let close = self.advance().clone();
        Ok(Pipelines {
            pipes,
            plan: PipePlan::default(),
            span: Self::union_spans(
                &Self::span_from_token(&keyword),
                &Self::span_from_token(&close),
            ),
        })
    }

    fn parse_pipe_inputs(&mut self) -> Result<Vec<Expression>> {
        let mut inputs = vec![self.parse_expression_with(terminator_pipe_input)?];
        while matches!(self.peek_kind(), TokenKind::Comma) {
            self.advance();
            inputs.push(self.parse_expression_with(terminator_pipe_input)?);
        }
        Ok(inputs)
    }

    /// Parses `OPERATOR target` after a stage's inputs.
    fn parse_pipe_from(&mut self, inputs: Vec<Expression>) -> Result<PipeDec> {
        let operator_token = self.peek().clone();
        if operator_token.kind != TokenKind::PipeOperator {
            return self.fail(
                format!("expected a pipe operator, found '{}'", operator_token.lexeme),
                Self::span_from_token(&operator_token),
            );
        }
        self.advance();

        let mut targets = self.parse_pipe_inputs()?;
        let next = if matches!(self.peek_kind(), TokenKind::PipeOperator) {
            PipeTarget::Pipe(Box::new(self.parse_pipe_from(targets)?))
        } else if targets.len() == 1 {
            PipeTarget::Sink(targets.remove(0))
        } else {
            let span = targets[1].span;
            return self.fail("a pipe must end in a single sink".to_string(), span);
        };

        Ok(PipeDec {
            inputs,
            operator: operator_token.lexeme.clone(),
            operator_span: Self::span_from_token(&operator_token),
            next,
        })
    }

    fn parse_expression_with(&mut self, terminator: fn(&TokenKind) -> bool) -> Result<Expression> {
        self.parse_expression_prec(Precedence::Lowest, terminator)
    }

    fn parse_expression_prec(
        &mut self,
        precedence: Precedence,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Expression> {
        self.skip_newlines_unless(terminator);
        let mut expr = self.parse_prefix_expression(terminator)?;

        loop {
            if self.is_at_end() || terminator(self.peek_kind()) {
                break;
            }

            match self.peek_kind() {
                TokenKind::LParen => {
                    expr = self.finish_call(expr)?;
                    continue;
                }
                TokenKind::LBracket => {
                    expr = self.finish_index(expr)?;
                    continue;
                }
                TokenKind::Dot => {
                    expr = self.finish_member(expr)?;
                    continue;
                }
                TokenKind::Newline => {
                    self.advance();
                    continue;
                }
                _ => {}
            }

            let next_precedence = match Precedence::of(self.peek_kind()) {
                Some(p) => p,
                None => break,
            };

            if precedence >= next_precedence {
                break;
            }

            expr = self.parse_infix_expression(expr, next_precedence, terminator)?;
        }

        Ok(expr)
    }

    fn parse_prefix_expression(
        &mut self,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Expression> {
        let token = self.advance().clone();
        let token_span = Self::span_from_token(&token);
        match token.kind {
            TokenKind::Identifier => Ok(Expression::new(
                token_span,
                ExpressionKind::Identifier(Identifier::new(token.lexeme, token_span)),
            )),
            TokenKind::IntegerLiteral(value) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::Integer(value)),
            )),
            TokenKind::RationalLiteral(value) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::Rational(value)),
            )),
            TokenKind::StringLiteral(value) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::String(value)),
            )),
            TokenKind::BooleanLiteral(value) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::Boolean(value)),
            )),
            TokenKind::Keyword(Keyword::None) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::Null),
            )),
            TokenKind::Keyword(Keyword::All) => Ok(Expression::new(
                token_span,
                ExpressionKind::Literal(Literal::Undefined),
            )),
            TokenKind::Keyword(Keyword::SelfValue) => {
                Ok(Expression::new(token_span, ExpressionKind::SelfRef))
            }
            TokenKind::Minus | TokenKind::Bang => {
                let operator = if token.kind == TokenKind::Minus {
                    UnaryOperator::Negate
                } else {
                    UnaryOperator::Not
                };
                let operand = self.parse_expression_prec(Precedence::Unary, terminator)?;
                let span = Self::union_spans(&token_span, &operand.span);
                Ok(Expression::new(
                    span,
                    ExpressionKind::Unary(UnaryExpression {
                        operator,
                        operand: Box::new(operand),
                    }),
                ))
            }
            TokenKind::LParen => {
                let mut expr = self.parse_expression_prec(Precedence::Lowest, terminator_rparen)?;
                let closing_token = self.peek().clone();
                self.expect_token(TokenKind::RParen, "expected ')' after expression")?;
                expr.span = Self::union_spans(&token_span, &Self::span_from_token(&closing_token));
                Ok(expr)
            }
            TokenKind::PipePipe => self.parse_list_literal(token_span),
            TokenKind::MapOpen => self.parse_map_literal(token_span),
            _ => self.fail(format!("unexpected token '{}'", token.lexeme), token_span),
        }
    }

    fn parse_list_literal(&mut self, opening_span: SourceSpan) -> Result<Expression> {
        let mut elements = Vec::new();
        self.skip_newlines();
        if !matches!(self.peek_kind(), TokenKind::PipePipe) {
            loop {
                elements.push(self.parse_expression_with(terminator_comma_or_pipepipe)?);
                self.skip_newlines();
                if matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let closing_token = self.peek().clone();
        self.expect_token(TokenKind::PipePipe, "expected '||' to close list literal")?;
        let span = Self::union_spans(&opening_span, &Self::span_from_token(&closing_token));
        Ok(Expression::new(
            span,
            ExpressionKind::List(ListExp { elements }),
        ))
    }

    fn parse_map_literal(&mut self, opening_span: SourceSpan) -> Result<Expression> {
        let mut entries = Vec::new();
        self.skip_newlines();
        if !matches!(self.peek_kind(), TokenKind::MapClose) {
            loop {
                let key = self.parse_expression_with(terminator_colon)?;
                self.expect_token(TokenKind::Colon, "expected ':' after map key")?;
                let value = self.parse_expression_with(terminator_comma_or_map_close)?;
                entries.push(KeyValuePair { key, value });
                self.skip_newlines();
                if matches!(self.peek_kind(), TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        let closing_token = self.peek().clone();
        self.expect_token(TokenKind::MapClose, "expected '>>' to close map literal")?;
        let span = Self::union_spans(&opening_span, &Self::span_from_token(&closing_token));
        Ok(Expression::new(span, ExpressionKind::Map(MapExp { entries })))
    }

    fn parse_infix_expression(
        &mut self,
        left: Expression,
        precedence: Precedence,
        terminator: fn(&TokenKind) -> bool,
    ) -> Result<Expression> {
        let operator_token = self.advance().clone();
        let operator = match binary_operator_from_token(&operator_token.kind) {
            Some(operator) => operator,
            None => {
                return self.fail(
                    format!("unexpected infix operator '{}'", operator_token.lexeme),
                    Self::span_from_token(&operator_token),
                )
            }
        };
        // `^` is right-associative.
        let right_precedence = if operator == BinaryOperator::Power {
            Precedence::Factor
        } else {
            precedence
        };
        let right = self.parse_expression_prec(right_precedence, terminator)?;
        let span = Self::union_spans(&left.span, &right.span);
        Ok(Expression::new(
            span,
            ExpressionKind::Binary(BinaryExpression {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            }),
        ))
    }

    fn parse_arguments(&mut self) -> Result<(Vec<Expression>, SourceSpan)> {
        let open_token = self.peek().clone();
        self.expect_token(TokenKind::LParen, "expected '(' to start argument list")?;
        let mut arguments = Vec::new();
        self.skip_newlines();
        if !matches!(self.peek_kind(), TokenKind::RParen) {
            loop {
                arguments.push(self.parse_expression_with(terminator_comma_or_rparen)?);
                self.skip_newlines();
                match self.peek_kind() {
                    TokenKind::Comma => {
                        self.advance();
                    }
                    TokenKind::RParen => break,
                    _ => {
                        let token = self.peek().clone();
                        return self.fail(
                            format!(
                                "expected ',' or ')' in argument list, found '{}'",
                                token.lexeme
                            ),
                            Self::span_from_token(&token),
                        );
                    }
                }
            }
        }
        let closing_token = self.advance().clone();
        let span = Self::union_spans(
            &Self::span_from_token(&open_token),
            &Self::span_from_token(&closing_token),
        );
        Ok((arguments, span))
    }

    fn finish_call(&mut self, callee: Expression) -> Result<Expression> {
        let callee = match callee.kind {
            ExpressionKind::Identifier(identifier) => identifier,
            _ => {
                return self.fail(
                    "only named functions and prototypes can be called".to_string(),
                    callee.span,
                )
            }
        };
        let (arguments, arguments_span) = self.parse_arguments()?;
        let span = Self::union_spans(&callee.span, &arguments_span);
        Ok(Expression::new(
            span,
            ExpressionKind::Call(CallExpression { callee, arguments }),
        ))
    }

    fn finish_index(&mut self, object: Expression) -> Result<Expression> {
        self.expect_token(TokenKind::LBracket, "expected '[' for index expression")?;
        let index = self.parse_expression_prec(Precedence::Lowest, terminator_rbracket)?;
        let closing_token = self.peek().clone();
        self.expect_token(TokenKind::RBracket, "expected ']' after index expression")?;
        let span = Self::union_spans(&object.span, &Self::span_from_token(&closing_token));
        Ok(Expression::new(
            span,
            ExpressionKind::Index(IndexExpression {
                object: Box::new(object),
                index: Box::new(index),
            }),
        ))
    }

    fn finish_member(&mut self, object: Expression) -> Result<Expression> {
        self.expect_token(TokenKind::Dot, "expected '.' for member access")?;
        let name = self.parse_identifier("expected attribute or method name after '.'")?;

        if matches!(self.peek_kind(), TokenKind::LParen) {
            let (arguments, arguments_span) = self.parse_arguments()?;
            let span = Self::union_spans(&object.span, &arguments_span);
            return Ok(Expression::new(
                span,
                ExpressionKind::Method(MethodExpression {
                    object: Box::new(object),
                    method: name,
                    arguments,
                }),
            ));
        }

        let span = Self::union_spans(&object.span, &name.span);
        Ok(Expression::new(
            span,
            ExpressionKind::Access(AccessExpression {
                object: Box::new(object),
                attribute: name,
            }),
        ))
    }

    fn expect_statement_end(&mut self, message: &str) -> Result<()> {
        match self.peek_kind() {
            TokenKind::Newline => {
                self.skip_newlines();
                Ok(())
            }
            TokenKind::Eof | TokenKind::RBrace => Ok(()),
            _ => {
                let token = self.peek().clone();
                self.fail(
                    format!("{} (found '{}')", message, token.lexeme),
                    Self::span_from_token(&token),
                )
            }
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, message: &str) -> Result<()> {
        if self.check_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            let token = self.peek().clone();
            self.fail(
                format!("{} (found '{}')", message, token.lexeme),
                Self::span_from_token(&token),
            )
        }
    }

    fn expect_token(&mut self, expected: TokenKind, message: &str) -> Result<()> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            let token = self.peek().clone();
            self.fail(
                format!("{} (found '{}')", message, token.lexeme),
                Self::span_from_token(&token),
            )
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek_kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_newlines_unless(&mut self, terminator: fn(&TokenKind) -> bool) {
        if !terminator(&TokenKind::Newline) {
            self.skip_newlines();
        }
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek_kind(), TokenKind::Keyword(kw) if *kw == keyword)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.tokens[self.current].kind
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens
            .get(self.current + offset)
            .map(|token| token.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        &self.tokens[self.current - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }
}

fn terminator_statement(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Newline | TokenKind::RBrace | TokenKind::Eof)
}

fn terminator_pipe_input(kind: &TokenKind) -> bool {
    terminator_statement(kind) || matches!(kind, TokenKind::Comma | TokenKind::PipeOperator)
}

fn terminator_colon(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Colon)
}

fn terminator_rparen(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::RParen)
}

fn terminator_rbracket(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::RBracket)
}

fn terminator_comma_or_rparen(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Comma | TokenKind::RParen)
}

fn terminator_comma_or_pipepipe(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Comma | TokenKind::PipePipe)
}

fn terminator_comma_or_map_close(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Comma | TokenKind::MapClose)
}

fn binary_operator_from_token(kind: &TokenKind) -> Option<BinaryOperator> {
    let operator = match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Subtract,
        TokenKind::Star => BinaryOperator::Multiply,
        TokenKind::Slash => BinaryOperator::Divide,
        TokenKind::Percent => BinaryOperator::Modulo,
        TokenKind::Caret => BinaryOperator::Power,
        TokenKind::DoubleEqual => BinaryOperator::Equal,
        TokenKind::BangEqual => BinaryOperator::NotEqual,
        TokenKind::Greater => BinaryOperator::Greater,
        TokenKind::GreaterEqual => BinaryOperator::GreaterEqual,
        TokenKind::Less => BinaryOperator::Less,
        TokenKind::LessEqual => BinaryOperator::LessEqual,
        TokenKind::Keyword(Keyword::And) => BinaryOperator::And,
        TokenKind::Keyword(Keyword::Or) => BinaryOperator::Or,
        _ => return None,
    };
    Some(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(source: &str) -> Result<Program> {
        let file = SourceFile::inline(source);
        let tokens = Lexer::new(&file)?.tokenize()?;
        Parser::new(&file, tokens).parse()
    }

    fn definitions(source: &str) -> Vec<Statement> {
        parse(source)
            .expect("program parses")
            .definitions
            .expect("definitions block")
            .block
            .statements
    }

    #[test]
    fn parses_blocks_on_one_line() {
        let program = parse("Definitions{INT x <== 683}Pipelines{x --> print}").unwrap();
        assert_eq!(program.definitions.unwrap().block.statements.len(), 1);
        assert_eq!(program.pipelines.unwrap().pipes.len(), 1);
    }

    #[test]
    fn power_is_right_associative() {
        let statements = definitions("Definitions{\nINT x <== 2 ^ 3 ^ 2\n}");
        let Statement::Variable(dec) = &statements[0] else {
            panic!("expected variable declaration");
        };
        let ExpressionKind::Binary(binary) = &dec.value.kind else {
            panic!("expected binary expression");
        };
        assert_eq!(binary.operator, BinaryOperator::Power);
        assert!(matches!(binary.right.kind, ExpressionKind::Binary(_)));
        assert!(matches!(binary.left.kind, ExpressionKind::Literal(_)));
    }

    #[test]
    fn parses_prototype_members() {
        let statements = definitions(
            "Definitions{\nPROTO BOX{\nATR INT volume\nBOX FUNC BOX(INT volume){\nself.volume <== volume\n}\nATR INT FUNC size(){\nreturn self.volume\n}\n}\n}",
        );
        let Statement::Prototype(prototype) = &statements[0] else {
            panic!("expected prototype");
        };
        assert!(matches!(prototype.body.statements[0], Statement::Attribute(_)));
        assert!(matches!(prototype.body.statements[1], Statement::Function(_)));
        assert!(matches!(prototype.body.statements[2], Statement::Method(_)));
        let Statement::Function(constructor) = &prototype.body.statements[1] else {
            unreachable!();
        };
        assert!(matches!(
            &constructor.body.statements[0],
            Statement::Assignment(Assignment { is_self: true, .. })
        ));
    }

    #[test]
    fn parses_for_header_clauses() {
        let statements =
            definitions("Definitions{\nfor(INT i <== 0 : i < 10 : i <++ 1){\nbreak\n}\n}");
        let Statement::For(for_statement) = &statements[0] else {
            panic!("expected for statement");
        };
        assert!(matches!(*for_statement.initializer, Statement::Variable(_)));
        assert!(matches!(
            *for_statement.step,
            Statement::Assignment(Assignment {
                operator: AssignOperator::AddAssign,
                ..
            })
        ));
        assert_eq!(for_statement.body.statements, vec![Statement::Break(SourceSpan::new(3, 1, 3, 5))]);
    }

    #[test]
    fn parses_containers() {
        let statements = definitions(
            "Definitions{\n||INT|| k <== ||1, 2, 3||\n<<BOOL>> m <== <<\"hasCar\": true>>\n||STR|| e <== ||||\n}",
        );
        assert!(matches!(&statements[0], Statement::List(ListDec { value, .. })
            if matches!(&value.kind, ExpressionKind::List(list) if list.elements.len() == 3)));
        assert!(matches!(&statements[1], Statement::Map(_)));
        assert!(matches!(&statements[2], Statement::List(ListDec { value, .. })
            if matches!(&value.kind, ExpressionKind::List(list) if list.elements.is_empty())));
    }

    #[test]
    fn parses_chained_pipes() {
        let program = parse("Definitions{\nINT x <== 1\n}\nPipelines{\nx, x --> f -h-> print\n}").unwrap();
        let pipes = program.pipelines.unwrap().pipes;
        let head = &pipes[0];
        assert_eq!(head.inputs.len(), 2);
        assert_eq!(head.operator, "-->");
        let PipeTarget::Pipe(next) = &head.next else {
            panic!("expected chained pipe");
        };
        assert_eq!(next.operator, "-h->");
        assert!(matches!(next.next, PipeTarget::Sink(_)));
    }

    #[test]
    fn rejects_sink_lists() {
        assert!(parse("Pipelines{\nx --> a, b\n}").is_err());
    }
}
