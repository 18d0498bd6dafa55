use std::mem;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use tracing::{debug, trace};

use crate::ast::*;
use crate::types::Type;

/// Integer powers above this stay unfolded.
const MAX_FOLDED_EXPONENT: u32 = 4096;

#[derive(Debug, Clone, Copy)]
pub struct OptimizerOptions {
    /// Re-run until a round rewrites nothing.
    pub fixed_point: bool,
    pub max_rounds: usize,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            fixed_point: true,
            max_rounds: 16,
        }
    }
}

/// Tree rewriter run after analysis: constant folding, algebraic identities,
/// dead branch removal and self-assignment removal. It never fails.
pub struct Optimizer {
    options: OptimizerOptions,
    changed: bool,
}

impl Optimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self {
            options,
            changed: false,
        }
    }

    /// Rewrites `program` in place and returns how many rounds ran.
    pub fn optimize(&mut self, program: &mut Program) -> usize {
        let max_rounds = self.options.max_rounds.max(1);
        let mut rounds = 0;
        loop {
            self.changed = false;
            rounds += 1;

            if let Some(definitions) = &mut program.definitions {
                let statements = mem::take(&mut definitions.block.statements);
                definitions.block.statements = self.optimize_statements(statements);
            }
            if let Some(pipelines) = &mut program.pipelines {
                self.optimize_pipelines(pipelines);
            }

            debug!(round = rounds, changed = self.changed, "optimizer round");
            if !self.options.fixed_point || !self.changed || rounds >= max_rounds {
                break;
            }
        }
        rounds
    }

    fn mark(&mut self, rule: &'static str, span: SourceSpan) {
        trace!(rule, line = span.line, column = span.column, "rewrite");
        self.changed = true;
    }

    pub fn optimize_statements(&mut self, statements: Vec<Statement>) -> Vec<Statement> {
        statements
            .into_iter()
            .flat_map(|statement| self.optimize_statement(statement))
            .collect()
    }

    fn optimize_block(&mut self, block: Block) -> Block {
        Block::new(self.optimize_statements(block.statements))
    }

    /// Rewrites one statement into zero or more replacements.
    fn optimize_statement(&mut self, statement: Statement) -> Vec<Statement> {
        match statement {
            Statement::Variable(mut dec) => {
                dec.value = self.optimize_expression(dec.value);
                vec![Statement::Variable(dec)]
            }
            Statement::List(mut dec) => {
                dec.value = self.optimize_expression(dec.value);
                vec![Statement::List(dec)]
            }
            Statement::Map(mut dec) => {
                dec.value = self.optimize_expression(dec.value);
                vec![Statement::Map(dec)]
            }
            Statement::Assignment(mut assignment) => {
                assignment.value = self.optimize_expression(assignment.value);
                if is_self_assignment(&assignment) {
                    self.mark("self-assignment", assignment.span);
                    return Vec::new();
                }
                vec![Statement::Assignment(assignment)]
            }
            Statement::Function(mut dec) => {
                dec.body = self.optimize_block(dec.body);
                vec![Statement::Function(dec)]
            }
            Statement::Prototype(mut dec) => {
                dec.body = self.optimize_block(dec.body);
                vec![Statement::Prototype(dec)]
            }
            Statement::Attribute(mut dec) => {
                dec.value = dec.value.map(|value| self.optimize_expression(value));
                vec![Statement::Attribute(dec)]
            }
            Statement::Method(mut dec) => {
                dec.body = self.optimize_block(dec.body);
                vec![Statement::Method(dec)]
            }
            Statement::If(mut statement) => {
                statement.condition = self.optimize_expression(statement.condition);
                match statement.condition.as_boolean() {
                    Some(false) => {
                        self.mark("dead if", statement.condition.span);
                        Vec::new()
                    }
                    Some(true) => {
                        self.mark("constant if", statement.condition.span);
                        self.optimize_statements(statement.body.statements)
                    }
                    None => {
                        statement.body = self.optimize_block(statement.body);
                        vec![Statement::If(statement)]
                    }
                }
            }
            Statement::While(mut statement) => {
                statement.condition = self.optimize_expression(statement.condition);
                if statement.condition.as_boolean() == Some(false) {
                    self.mark("dead while", statement.condition.span);
                    return Vec::new();
                }
                statement.body = self.optimize_block(statement.body);
                vec![Statement::While(statement)]
            }
            Statement::For(mut statement) => {
                statement.condition = self.optimize_expression(statement.condition);
                let initializer = self.optimize_single(*statement.initializer);
                if statement.condition.as_boolean() == Some(false) {
                    self.mark("dead for", statement.span);
                    // The initializer still runs once when it calls something.
                    return if statement_has_call(&initializer) {
                        vec![initializer]
                    } else {
                        Vec::new()
                    };
                }
                statement.initializer = Box::new(initializer);
                statement.step = Box::new(self.optimize_single(*statement.step));
                statement.body = self.optimize_block(statement.body);
                vec![Statement::For(statement)]
            }
            Statement::Return(mut statement) => {
                statement.value = statement
                    .value
                    .map(|value| self.optimize_expression(value));
                vec![Statement::Return(statement)]
            }
            Statement::Break(span) => vec![Statement::Break(span)],
            Statement::Continue(span) => vec![Statement::Continue(span)],
            Statement::Expression(mut statement) => {
                statement.expression = self.optimize_expression(statement.expression);
                vec![Statement::Expression(statement)]
            }
        }
    }

    /// For a `for` header clause, which must remain exactly one statement.
    fn optimize_single(&mut self, statement: Statement) -> Statement {
        let changed = self.changed;
        let mut rewritten = self.optimize_statement(statement.clone());
        if rewritten.len() == 1 {
            rewritten.remove(0)
        } else {
            self.changed = changed;
            statement
        }
    }

    fn optimize_pipelines(&mut self, pipelines: &mut Pipelines) {
        for dec in &mut pipelines.pipes {
            self.optimize_pipe(dec);
        }
        for stage in &mut pipelines.plan.stages {
            stage.inputs = self.optimize_expressions(mem::take(&mut stage.inputs));
            stage.outputs = match mem::replace(&mut stage.outputs, PipeOutput::Values(Vec::new())) {
                PipeOutput::Values(values) => PipeOutput::Values(self.optimize_expressions(values)),
                PipeOutput::Drain { attributes, values } => PipeOutput::Drain {
                    attributes,
                    values: self.optimize_expressions(values),
                },
                PipeOutput::Spread { source, item } => PipeOutput::Spread {
                    source: self.optimize_expression(source),
                    item,
                },
            };
        }
    }

    fn optimize_pipe(&mut self, dec: &mut PipeDec) {
        dec.inputs = self.optimize_expressions(mem::take(&mut dec.inputs));
        match &mut dec.next {
            PipeTarget::Pipe(next) => self.optimize_pipe(next),
            PipeTarget::Sink(_) => {}
        }
    }

    fn optimize_expressions(&mut self, expressions: Vec<Expression>) -> Vec<Expression> {
        expressions
            .into_iter()
            .map(|expression| self.optimize_expression(expression))
            .collect()
    }

    /// Rewrites children first, then the node itself.
    pub fn optimize_expression(&mut self, expression: Expression) -> Expression {
        let Expression { span, kind, ty } = expression;
        let kind = match kind {
            ExpressionKind::Binary(binary) => {
                let left = self.optimize_expression(*binary.left);
                let right = self.optimize_expression(*binary.right);
                return self.simplify_binary(span, ty, binary.operator, left, right);
            }
            ExpressionKind::Unary(unary) => {
                let operand = self.optimize_expression(*unary.operand);
                return self.simplify_unary(span, ty, unary.operator, operand);
            }
            ExpressionKind::Index(index) => ExpressionKind::Index(IndexExpression {
                object: Box::new(self.optimize_expression(*index.object)),
                index: Box::new(self.optimize_expression(*index.index)),
            }),
            ExpressionKind::Access(access) => ExpressionKind::Access(AccessExpression {
                object: Box::new(self.optimize_expression(*access.object)),
                attribute: access.attribute,
            }),
            ExpressionKind::Method(method) => ExpressionKind::Method(MethodExpression {
                object: Box::new(self.optimize_expression(*method.object)),
                method: method.method,
                arguments: self.optimize_expressions(method.arguments),
            }),
            ExpressionKind::Call(call) => ExpressionKind::Call(CallExpression {
                callee: call.callee,
                arguments: self.optimize_expressions(call.arguments),
            }),
            ExpressionKind::List(list) => ExpressionKind::List(ListExp {
                elements: self.optimize_expressions(list.elements),
            }),
            ExpressionKind::Map(map) => ExpressionKind::Map(MapExp {
                entries: map
                    .entries
                    .into_iter()
                    .map(|entry| KeyValuePair {
                        key: self.optimize_expression(entry.key),
                        value: self.optimize_expression(entry.value),
                    })
                    .collect(),
            }),
            ExpressionKind::Cast(cast) => ExpressionKind::Cast(CastExpression {
                value: Box::new(self.optimize_expression(*cast.value)),
                target: cast.target,
            }),
            other => other,
        };
        Expression { span, kind, ty }
    }

    fn simplify_binary(
        &mut self,
        span: SourceSpan,
        ty: Option<Type>,
        operator: BinaryOperator,
        left: Expression,
        right: Expression,
    ) -> Expression {
        if let (Some(a), Some(b)) = (left.as_literal(), right.as_literal()) {
            if let Some(folded) = fold_numeric(operator, a, b) {
                self.mark("fold", span);
                return literal_expression(span, folded);
            }
        }

        match self.apply_identity(span, operator, left, right) {
            Ok(simplified) => simplified,
            Err((left, right)) => Expression {
                span,
                kind: ExpressionKind::Binary(BinaryExpression {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                ty,
            },
        }
    }

    /// Algebraic and boolean identities. Hands the operands back when none applies.
    fn apply_identity(
        &mut self,
        span: SourceSpan,
        operator: BinaryOperator,
        left: Expression,
        right: Expression,
    ) -> Result<Expression, (Expression, Expression)> {
        let rule = match operator {
            BinaryOperator::Add if is_zero(&right) => Some(("x+0", Keep::Left)),
            BinaryOperator::Add if is_zero(&left) => Some(("0+x", Keep::Right)),
            BinaryOperator::Subtract if is_zero(&right) => Some(("x-0", Keep::Left)),
            BinaryOperator::Subtract if is_zero(&left) => Some(("0-x", Keep::NegatedRight)),
            BinaryOperator::Multiply if is_one(&right) => Some(("x*1", Keep::Left)),
            BinaryOperator::Multiply if is_one(&left) => Some(("1*x", Keep::Right)),
            BinaryOperator::Multiply if is_zero(&right) && !has_call(&left) => {
                Some(("x*0", Keep::Right))
            }
            BinaryOperator::Multiply if is_zero(&left) && !has_call(&right) => {
                Some(("0*x", Keep::Left))
            }
            BinaryOperator::Divide if is_one(&right) => Some(("x/1", Keep::Left)),
            BinaryOperator::Divide if is_zero(&left) && !is_zero(&right) && !has_call(&right) => {
                Some(("0/x", Keep::Left))
            }
            BinaryOperator::Power if is_zero(&right) && !has_call(&left) => {
                Some(("x^0", Keep::OneLike))
            }
            BinaryOperator::Power if is_one(&left) && !has_call(&right) => {
                Some(("1^x", Keep::Left))
            }
            BinaryOperator::And => match (left.as_boolean(), right.as_boolean()) {
                (Some(true), _) => Some(("true and x", Keep::Right)),
                (_, Some(true)) => Some(("x and true", Keep::Left)),
                (Some(false), _) => Some(("false and x", Keep::Left)),
                (_, Some(false)) if !has_call(&left) => Some(("x and false", Keep::Right)),
                _ => None,
            },
            BinaryOperator::Or => match (left.as_boolean(), right.as_boolean()) {
                (Some(false), _) => Some(("false or x", Keep::Right)),
                (_, Some(false)) => Some(("x or false", Keep::Left)),
                (Some(true), _) => Some(("true or x", Keep::Left)),
                (_, Some(true)) if !has_call(&left) => Some(("x or true", Keep::Right)),
                _ => None,
            },
            _ => None,
        };

        let Some((name, keep)) = rule else {
            return Err((left, right));
        };
        self.mark(name, span);
        Ok(match keep {
            Keep::Left => left,
            Keep::Right => right,
            Keep::NegatedRight => {
                let ty = right.ty.clone();
                let negated = Expression {
                    span,
                    kind: ExpressionKind::Unary(UnaryExpression {
                        operator: UnaryOperator::Negate,
                        operand: Box::new(right),
                    }),
                    ty,
                };
                self.simplify_existing_unary(negated)
            }
            Keep::OneLike => {
                let rational = matches!(right.as_literal(), Some(Literal::Rational(_)))
                    || left.ty == Some(Type::RAT);
                let one = if rational {
                    Literal::Rational(1.0)
                } else {
                    Literal::Integer(BigInt::from(1))
                };
                literal_expression(span, one)
            }
        })
    }

    fn simplify_existing_unary(&mut self, expression: Expression) -> Expression {
        let Expression { span, kind, ty } = expression;
        match kind {
            ExpressionKind::Unary(unary) => {
                self.simplify_unary(span, ty, unary.operator, *unary.operand)
            }
            kind => Expression { span, kind, ty },
        }
    }

    fn simplify_unary(
        &mut self,
        span: SourceSpan,
        ty: Option<Type>,
        operator: UnaryOperator,
        operand: Expression,
    ) -> Expression {
        let folded = match (operator, operand.as_literal()) {
            (UnaryOperator::Negate, Some(Literal::Integer(value))) => {
                Some(Literal::Integer(-value.clone()))
            }
            (UnaryOperator::Negate, Some(Literal::Rational(value))) => {
                Some(Literal::Rational(-value))
            }
            (UnaryOperator::Not, Some(Literal::Boolean(value))) => Some(Literal::Boolean(!value)),
            _ => None,
        };
        if let Some(literal) = folded {
            self.mark("fold unary", span);
            return literal_expression(span, literal);
        }
        Expression {
            span,
            kind: ExpressionKind::Unary(UnaryExpression {
                operator,
                operand: Box::new(operand),
            }),
            ty,
        }
    }
}

enum Keep {
    Left,
    Right,
    NegatedRight,
    OneLike,
}

fn literal_expression(span: SourceSpan, literal: Literal) -> Expression {
    let ty = match &literal {
        Literal::Integer(_) => Type::INT,
        Literal::Rational(_) => Type::RAT,
        Literal::String(_) => Type::STR,
        Literal::Boolean(_) => Type::BOOL,
        Literal::Null | Literal::Undefined => Type::DNE,
    };
    Expression::typed(span, ExpressionKind::Literal(literal), ty)
}

fn is_zero(expression: &Expression) -> bool {
    match expression.as_literal() {
        Some(Literal::Integer(value)) => value.is_zero(),
        Some(Literal::Rational(value)) => *value == 0.0,
        _ => false,
    }
}

fn is_one(expression: &Expression) -> bool {
    match expression.as_literal() {
        Some(Literal::Integer(value)) => *value == BigInt::from(1),
        Some(Literal::Rational(value)) => *value == 1.0,
        _ => false,
    }
}

/// Whether evaluating the expression may run user code.
pub fn has_call(expression: &Expression) -> bool {
    match &expression.kind {
        ExpressionKind::Call(_) | ExpressionKind::Method(_) => true,
        ExpressionKind::Binary(binary) => has_call(&binary.left) || has_call(&binary.right),
        ExpressionKind::Unary(unary) => has_call(&unary.operand),
        ExpressionKind::Index(index) => has_call(&index.object) || has_call(&index.index),
        ExpressionKind::Access(access) => has_call(&access.object),
        ExpressionKind::List(list) => list.elements.iter().any(has_call),
        ExpressionKind::Map(map) => map
            .entries
            .iter()
            .any(|entry| has_call(&entry.key) || has_call(&entry.value)),
        ExpressionKind::Cast(cast) => has_call(&cast.value),
        ExpressionKind::Identifier(_) | ExpressionKind::Literal(_) | ExpressionKind::SelfRef => {
            false
        }
    }
}

fn statement_has_call(statement: &Statement) -> bool {
    match statement {
        Statement::Variable(dec) => has_call(&dec.value),
        Statement::List(dec) => has_call(&dec.value),
        Statement::Map(dec) => has_call(&dec.value),
        Statement::Assignment(assignment) => has_call(&assignment.value),
        Statement::Expression(statement) => has_call(&statement.expression),
        _ => false,
    }
}

/// `x <== x` on the same resolved symbol, or `self.a <== self.a`.
fn is_self_assignment(assignment: &Assignment) -> bool {
    if assignment.operator != AssignOperator::Assign {
        return false;
    }
    let Some(target) = assignment.target.symbol else {
        return false;
    };
    match &assignment.value.kind {
        ExpressionKind::Identifier(identifier) if !assignment.is_self => {
            identifier.symbol == Some(target)
        }
        ExpressionKind::Access(access) if assignment.is_self => {
            matches!(access.object.kind, ExpressionKind::SelfRef)
                && access.attribute.symbol == Some(target)
        }
        _ => false,
    }
}

/// Evaluates `a op b` over numeric literals the way the emitted program would.
pub fn fold_numeric(operator: BinaryOperator, a: &Literal, b: &Literal) -> Option<Literal> {
    match (a, b) {
        (Literal::Integer(a), Literal::Integer(b)) => fold_integers(operator, a, b),
        _ => fold_rationals(operator, as_f64(a)?, as_f64(b)?),
    }
}

fn as_f64(literal: &Literal) -> Option<f64> {
    match literal {
        Literal::Integer(value) => value.to_f64(),
        Literal::Rational(value) => Some(*value),
        _ => None,
    }
}

fn fold_integers(operator: BinaryOperator, a: &BigInt, b: &BigInt) -> Option<Literal> {
    let value = match operator {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b.is_zero() {
                return None;
            }
            return fold_rationals(operator, a.to_f64()?, b.to_f64()?);
        }
        BinaryOperator::Modulo => {
            if b.is_zero() {
                return None;
            }
            a % b
        }
        BinaryOperator::Power => {
            if b.is_negative() {
                return fold_rationals(operator, a.to_f64()?, b.to_f64()?);
            }
            let exponent = b.to_u32().filter(|e| *e <= MAX_FOLDED_EXPONENT)?;
            a.pow(exponent)
        }
        BinaryOperator::Equal => return Some(Literal::Boolean(a == b)),
        BinaryOperator::NotEqual => return Some(Literal::Boolean(a != b)),
        BinaryOperator::Less => return Some(Literal::Boolean(a < b)),
        BinaryOperator::LessEqual => return Some(Literal::Boolean(a <= b)),
        BinaryOperator::Greater => return Some(Literal::Boolean(a > b)),
        BinaryOperator::GreaterEqual => return Some(Literal::Boolean(a >= b)),
        BinaryOperator::And | BinaryOperator::Or => return None,
    };
    Some(Literal::Integer(value))
}

fn fold_rationals(operator: BinaryOperator, a: f64, b: f64) -> Option<Literal> {
    let value = match operator {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide if b != 0.0 => a / b,
        BinaryOperator::Modulo if b != 0.0 => a % b,
        BinaryOperator::Power => a.powf(b),
        BinaryOperator::Equal => return Some(Literal::Boolean(a == b)),
        BinaryOperator::NotEqual => return Some(Literal::Boolean(a != b)),
        BinaryOperator::Less => return Some(Literal::Boolean(a < b)),
        BinaryOperator::LessEqual => return Some(Literal::Boolean(a <= b)),
        BinaryOperator::Greater => return Some(Literal::Boolean(a > b)),
        BinaryOperator::GreaterEqual => return Some(Literal::Boolean(a >= b)),
        _ => return None,
    };
    value.is_finite().then_some(Literal::Rational(value))
}
