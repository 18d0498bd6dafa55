//! Property-based tests for constant folding and the optimizer's rewrite rules.
//!
//! Random integer expressions over a single variable `x` are rendered to
//! source, compiled, and compared against direct evaluation.

use std::path::PathBuf;

use num_bigint::BigInt;
use plumb_compiler::{
    fold_numeric, BinaryOperator, Compilation, CompileOptions, Compiler, Expression,
    ExpressionKind, Literal, Optimizer, OptimizerOptions, SourceFile, SourceId, Statement,
    UnaryOperator,
};
use proptest::prelude::*;

const X: i64 = 3;

/// Mirror of the integer subset of the expression grammar.
#[derive(Debug, Clone)]
enum TestExpr {
    X,
    Int(i64),
    Neg(Box<TestExpr>),
    Add(Box<TestExpr>, Box<TestExpr>),
    Sub(Box<TestExpr>, Box<TestExpr>),
    Mul(Box<TestExpr>, Box<TestExpr>),
}

impl TestExpr {
    fn render(&self) -> String {
        match self {
            TestExpr::X => "x".to_string(),
            TestExpr::Int(value) => value.to_string(),
            TestExpr::Neg(inner) => format!("-({})", inner.render()),
            TestExpr::Add(a, b) => format!("({} + {})", a.render(), b.render()),
            TestExpr::Sub(a, b) => format!("({} - {})", a.render(), b.render()),
            TestExpr::Mul(a, b) => format!("({} * {})", a.render(), b.render()),
        }
    }

    fn eval(&self, x: i64) -> BigInt {
        match self {
            TestExpr::X => BigInt::from(x),
            TestExpr::Int(value) => BigInt::from(*value),
            TestExpr::Neg(inner) => -inner.eval(x),
            TestExpr::Add(a, b) => a.eval(x) + b.eval(x),
            TestExpr::Sub(a, b) => a.eval(x) - b.eval(x),
            TestExpr::Mul(a, b) => a.eval(x) * b.eval(x),
        }
    }

    fn mentions_x(&self) -> bool {
        match self {
            TestExpr::X => true,
            TestExpr::Int(_) => false,
            TestExpr::Neg(inner) => inner.mentions_x(),
            TestExpr::Add(a, b) | TestExpr::Sub(a, b) | TestExpr::Mul(a, b) => {
                a.mentions_x() || b.mentions_x()
            }
        }
    }
}

fn test_expr() -> impl Strategy<Value = TestExpr> {
    let leaf = prop_oneof![
        2 => Just(TestExpr::X),
        1 => Just(TestExpr::Int(0)),
        1 => Just(TestExpr::Int(1)),
        2 => (0i64..50).prop_map(TestExpr::Int),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| TestExpr::Neg(Box::new(e))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| TestExpr::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| TestExpr::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| TestExpr::Mul(Box::new(a), Box::new(b))),
        ]
    })
}

fn compile(expr: &TestExpr) -> Compilation {
    let source = format!("Definitions{{\nINT x <== {X}\nINT y <== {}\n}}\n", expr.render());
    let mut compiler = Compiler::new(CompileOptions::default());
    let file = SourceFile::new(SourceId(0), PathBuf::from("prop.plumb"), source);
    match compiler.compile(&file) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err:?}: {:?}", compiler.diagnostics().entries()),
    }
}

fn optimized_value(compilation: &Compilation) -> &Expression {
    let statements = &compilation
        .program
        .definitions
        .as_ref()
        .expect("definitions")
        .block
        .statements;
    match &statements[1] {
        Statement::Variable(dec) => &dec.value,
        other => panic!("expected y's declaration, found {other:?}"),
    }
}

/// Evaluates what is left of an optimized integer expression.
fn evaluate(expression: &Expression, x: i64) -> BigInt {
    match &expression.kind {
        ExpressionKind::Literal(Literal::Integer(value)) => value.clone(),
        ExpressionKind::Identifier(identifier) if identifier.name == "x" => BigInt::from(x),
        ExpressionKind::Unary(unary) if unary.operator == UnaryOperator::Negate => {
            -evaluate(&unary.operand, x)
        }
        ExpressionKind::Binary(binary) => {
            let left = evaluate(&binary.left, x);
            let right = evaluate(&binary.right, x);
            match binary.operator {
                BinaryOperator::Add => left + right,
                BinaryOperator::Subtract => left - right,
                BinaryOperator::Multiply => left * right,
                other => panic!("unexpected operator {other:?}"),
            }
        }
        other => panic!("unexpected node {other:?}"),
    }
}

fn int(value: i64) -> Literal {
    Literal::Integer(BigInt::from(value))
}

proptest! {
    #[test]
    fn integer_folding_matches_direct_evaluation(a in any::<i64>(), b in any::<i64>()) {
        let (wide_a, wide_b) = (BigInt::from(a), BigInt::from(b));
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Add, &int(a), &int(b)),
            Some(Literal::Integer(&wide_a + &wide_b))
        );
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Subtract, &int(a), &int(b)),
            Some(Literal::Integer(&wide_a - &wide_b))
        );
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Multiply, &int(a), &int(b)),
            Some(Literal::Integer(&wide_a * &wide_b))
        );
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Less, &int(a), &int(b)),
            Some(Literal::Boolean(a < b))
        );
    }

    #[test]
    fn division_folds_like_floating_point(a in -100_000i32..100_000, b in -1_000i32..1_000) {
        prop_assume!(b != 0);
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Divide, &int(a.into()), &int(b.into())),
            Some(Literal::Rational(f64::from(a) / f64::from(b)))
        );
    }

    #[test]
    fn small_powers_fold_exactly(base in -20i64..20, exponent in 0u32..12) {
        prop_assert_eq!(
            fold_numeric(BinaryOperator::Power, &int(base), &int(exponent.into())),
            Some(Literal::Integer(BigInt::from(base).pow(exponent)))
        );
    }

    #[test]
    fn rational_folding_matches_f64(a in -1.0e6f64..1.0e6, b in -1.0e6f64..1.0e6) {
        let fold = |operator| fold_numeric(operator, &Literal::Rational(a), &Literal::Rational(b));
        prop_assert_eq!(fold(BinaryOperator::Add), Some(Literal::Rational(a + b)));
        prop_assert_eq!(fold(BinaryOperator::Subtract), Some(Literal::Rational(a - b)));
        prop_assert_eq!(fold(BinaryOperator::Multiply), Some(Literal::Rational(a * b)));
    }

    #[test]
    fn optimizing_preserves_value(expr in test_expr()) {
        let compilation = compile(&expr);
        let value = optimized_value(&compilation);
        prop_assert_eq!(evaluate(value, X), expr.eval(X));
    }

    #[test]
    fn constant_expressions_fold_to_a_literal(expr in test_expr()) {
        prop_assume!(!expr.mentions_x());
        let compilation = compile(&expr);
        prop_assert_eq!(
            &optimized_value(&compilation).kind,
            &ExpressionKind::Literal(Literal::Integer(expr.eval(X)))
        );
    }

    #[test]
    fn optimizer_is_idempotent(expr in test_expr()) {
        let mut compilation = compile(&expr);
        let before = optimized_value(&compilation).clone();
        let rounds = Optimizer::new(OptimizerOptions::default()).optimize(&mut compilation.program);
        prop_assert_eq!(rounds, 1);
        prop_assert_eq!(optimized_value(&compilation), &before);
    }
}
