use std::path::PathBuf;

use num_bigint::BigInt;
use plumb_compiler::{
    Compilation, CompileOptions, Compiler, ExpressionKind, Literal, Optimizer, OptimizerOptions,
    SourceFile, SourceId, Statement, UnaryOperator,
};

fn compile_with(source: &str, options: CompileOptions) -> Compilation {
    let mut compiler = Compiler::new(options);
    let source_file = SourceFile::new(
        SourceId(0),
        PathBuf::from("optimize.plumb"),
        source.to_string(),
    );
    match compiler.compile(&source_file) {
        Ok(compilation) => compilation,
        Err(err) => panic!("{err:?}: {:?}", compiler.diagnostics().entries()),
    }
}

fn optimized(body: &str) -> Vec<Statement> {
    let compilation = compile_with(
        &format!("Definitions{{\n{body}\n}}\n"),
        CompileOptions::default(),
    );
    compilation
        .program
        .definitions
        .expect("definitions")
        .block
        .statements
}

fn value_of(statement: &Statement) -> &ExpressionKind {
    match statement {
        Statement::Variable(dec) => &dec.value.kind,
        other => panic!("expected a variable declaration, found {other:?}"),
    }
}

fn int(value: i64) -> ExpressionKind {
    ExpressionKind::Literal(Literal::Integer(BigInt::from(value)))
}

#[test]
fn folds_integer_arithmetic() {
    let statements = optimized("INT a <== 5 + 8\nINT b <== 5 ^ 8\nINT c <== 2 * (3 + 4) - 1");
    assert_eq!(value_of(&statements[0]), &int(13));
    assert_eq!(value_of(&statements[1]), &int(390625));
    assert_eq!(value_of(&statements[2]), &int(13));
}

#[test]
fn folds_division_to_a_rational() {
    let statements = optimized("DNE ratio <== 5 / 8");
    assert_eq!(
        value_of(&statements[0]),
        &ExpressionKind::Literal(Literal::Rational(0.625))
    );
}

#[test]
fn leaves_division_by_zero_alone() {
    let statements = optimized("INT a <== 1 / 0\nINT b <== 1 % 0");
    assert!(matches!(value_of(&statements[0]), ExpressionKind::Binary(_)));
    assert!(matches!(value_of(&statements[1]), ExpressionKind::Binary(_)));
}

#[test]
fn folds_negation_and_comparisons() {
    let statements = optimized("INT n <== -(3 + 4)\nBOOL lt <== 2 < 3\nBOOL flipped <== !true");
    assert_eq!(value_of(&statements[0]), &int(-7));
    assert_eq!(
        value_of(&statements[1]),
        &ExpressionKind::Literal(Literal::Boolean(true))
    );
    assert_eq!(
        value_of(&statements[2]),
        &ExpressionKind::Literal(Literal::Boolean(false))
    );
}

#[test]
fn applies_algebraic_identities() {
    let statements = optimized(
        "INT x <== 4\nINT a <== x + 0\nINT b <== 1 * x\nINT c <== 0 - x\nINT d <== x ^ 0\nINT e <== x * 0",
    );
    assert!(matches!(value_of(&statements[1]), ExpressionKind::Identifier(id) if id.name == "x"));
    assert!(matches!(value_of(&statements[2]), ExpressionKind::Identifier(id) if id.name == "x"));
    assert!(matches!(
        value_of(&statements[3]),
        ExpressionKind::Unary(unary) if unary.operator == UnaryOperator::Negate
    ));
    assert_eq!(value_of(&statements[4]), &int(1));
    assert_eq!(value_of(&statements[5]), &int(0));
}

#[test]
fn applies_division_and_power_identities() {
    let statements = optimized("INT x <== 4\nINT a <== x / 1\nINT b <== 0 / x\nINT c <== 1 ^ x");
    assert!(matches!(value_of(&statements[1]), ExpressionKind::Identifier(id) if id.name == "x"));
    assert_eq!(value_of(&statements[2]), &int(0));
    assert_eq!(value_of(&statements[3]), &int(1));
}

#[test]
fn applies_boolean_identities() {
    let statements = optimized(
        "INT x <== 4\nBOOL p <== x > 1\nBOOL a <== false or p\nBOOL b <== p or false\nBOOL c <== true or p\nBOOL d <== p or true\nBOOL e <== true and p\nBOOL g <== p and true",
    );
    let is_p = |kind: &ExpressionKind| matches!(kind, ExpressionKind::Identifier(id) if id.name == "p");
    let truth = ExpressionKind::Literal(Literal::Boolean(true));
    assert!(is_p(value_of(&statements[2])));
    assert!(is_p(value_of(&statements[3])));
    assert_eq!(value_of(&statements[4]), &truth);
    assert_eq!(value_of(&statements[5]), &truth);
    assert!(is_p(value_of(&statements[6])));
    assert!(is_p(value_of(&statements[7])));
}

#[test]
fn keeps_calls_that_an_identity_would_drop() {
    let statements = optimized(
        "INT FUNC f(){\nreturn 2\n}\nINT a <== f() * 0\nBOOL b <== f() == 2 and false\nBOOL c <== false and f() == 2\nBOOL d <== f() == 2 or true\nBOOL e <== true or f() == 2\nINT g <== 1 ^ f()\nINT h <== 0 / f()",
    );
    assert!(matches!(value_of(&statements[1]), ExpressionKind::Binary(_)));
    assert!(matches!(value_of(&statements[2]), ExpressionKind::Binary(_)));
    assert_eq!(
        value_of(&statements[3]),
        &ExpressionKind::Literal(Literal::Boolean(false))
    );
    assert!(matches!(value_of(&statements[4]), ExpressionKind::Binary(_)));
    assert_eq!(
        value_of(&statements[5]),
        &ExpressionKind::Literal(Literal::Boolean(true))
    );
    assert!(matches!(value_of(&statements[6]), ExpressionKind::Binary(_)));
    assert!(matches!(value_of(&statements[7]), ExpressionKind::Binary(_)));
}

#[test]
fn removes_dead_if_and_inlines_live_if() {
    let statements = optimized("if(false){\nprint(1)\n}\nif(true){\nprint(2)\nprint(3)\n}");
    assert_eq!(statements.len(), 2);
    assert!(statements
        .iter()
        .all(|statement| matches!(statement, Statement::Expression(_))));
}

#[test]
fn live_if_keeps_its_body_unchanged() {
    let body = "print(2)\nINT y <== 7";
    let inlined = optimized(&format!("if(true){{\n{body}\n}}"));
    let direct = optimized(body);
    assert_eq!(inlined.len(), direct.len());
    assert!(matches!(inlined[1], Statement::Variable(_)));
}

#[test]
fn removes_loops_with_false_guards() {
    let statements = optimized(
        "while(false){\nprint(1)\n}\nfor(INT i <== 0 : 1 > 2 : i <++ 1){\nprint(i)\n}",
    );
    assert!(statements.is_empty(), "{statements:?}");
}

#[test]
fn dead_for_keeps_an_initializer_with_a_call() {
    let statements = optimized(
        "INT FUNC start(){\nreturn 0\n}\nfor(INT i <== start() : false : i <++ 1){\nprint(i)\n}",
    );
    assert_eq!(statements.len(), 2);
    assert!(matches!(&statements[1], Statement::Variable(dec) if dec.name.name == "i"));
}

#[test]
fn removes_self_assignment_only() {
    let statements = optimized("INT x <== 1\nINT y <== 1\nx <== x\nx <== y\nx <== x + 0");
    assert_eq!(statements.len(), 3);
    let Statement::Assignment(kept) = &statements[2] else {
        panic!("expected the x <== y assignment to survive");
    };
    assert!(matches!(&kept.value.kind, ExpressionKind::Identifier(id) if id.name == "y"));
}

#[test]
fn removes_self_attribute_assignment() {
    let statements = optimized(
        "PROTO BOX{\nATR INT volume\nBOX FUNC BOX(INT v){\nself.volume <== self.volume\nself.volume <== v\n}\n}",
    );
    let Statement::Prototype(prototype) = &statements[0] else {
        panic!("expected prototype");
    };
    let Statement::Function(constructor) = &prototype.body.statements[1] else {
        panic!("expected constructor");
    };
    assert_eq!(constructor.body.statements.len(), 1);
}

#[test]
fn optimizes_pipeline_values() {
    let compilation = compile_with(
        "Definitions{\nINT x <== 1\n}\nPipelines{\nx + 0 --> print\n}\n",
        CompileOptions::default(),
    );
    let plan = &compilation.program.pipelines.as_ref().expect("pipelines").plan;
    let head = plan.stage(plan.chains[0]);
    assert!(matches!(
        &head.outputs.values()[0].kind,
        ExpressionKind::Identifier(id) if id.name == "x"
    ));
}

#[test]
fn reoptimizing_changes_nothing() {
    let mut compilation = compile_with(
        "Definitions{\nINT x <== 3\nINT y <== (x + 0) * 1 - 0\nINT z <== 0 - (x ^ 0)\nif(true){\nx <== x\n}\n}\n",
        CompileOptions::default(),
    );
    let before = compilation.program.definitions.clone().expect("definitions");
    let rounds = Optimizer::new(OptimizerOptions::default()).optimize(&mut compilation.program);
    assert_eq!(rounds, 1);
    assert_eq!(
        compilation.program.definitions.expect("definitions").block,
        before.block
    );
}

#[test]
fn reports_rounds_run() {
    let source = "Definitions{\nINT x <== 1 + 1\n}\n";
    let converged = compile_with(source, CompileOptions::default());
    assert_eq!(converged.optimizer_rounds, 2);

    let single = compile_with(
        source,
        CompileOptions {
            fixed_point: false,
            ..CompileOptions::default()
        },
    );
    assert_eq!(single.optimizer_rounds, 1);

    let disabled = compile_with(
        source,
        CompileOptions {
            optimize: false,
            ..CompileOptions::default()
        },
    );
    assert_eq!(disabled.optimizer_rounds, 0);
    let statements = disabled.program.definitions.expect("definitions").block.statements;
    assert!(matches!(value_of(&statements[0]), ExpressionKind::Binary(_)));
}
