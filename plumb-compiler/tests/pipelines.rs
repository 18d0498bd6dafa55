use std::path::PathBuf;

use plumb_compiler::{
    Compilation, CompileOptions, Compiler, ErrorCategory, Expression, ExpressionKind,
    PipeOperator, PipeOutput, PipePlan, SourceFile, SourceId, Type,
};

const DEFINITIONS: &str = "Definitions{
INT x <== 2
||INT|| k <== ||1, 2, 3||
INT FUNC f(INT n){
return n + 1
}
INT FUNC g(INT n){
return n * 10
}
INT FUNC add(INT a, INT b){
return a + b
}
PROTO BOX{
ATR INT height <== 1
ATR INT width <== 2
}
BOX b <== BOX()
}
";

fn compile_pipes(pipes: &str) -> (Compiler, anyhow::Result<Compilation>) {
    let source = format!("{DEFINITIONS}Pipelines{{\n{pipes}\n}}\n");
    let mut compiler = Compiler::new(CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    });
    let source_file = SourceFile::new(SourceId(0), PathBuf::from("pipes.plumb"), source);
    let result = compiler.compile(&source_file);
    (compiler, result)
}

fn plan(pipes: &str) -> PipePlan {
    let (compiler, result) = compile_pipes(pipes);
    match result {
        Ok(compilation) => compilation.program.pipelines.expect("pipelines").plan,
        Err(err) => panic!("{err:?}: {:?}", compiler.diagnostics().entries()),
    }
}

fn first_error(pipes: &str) -> (Option<ErrorCategory>, String) {
    let (compiler, result) = compile_pipes(pipes);
    assert!(result.is_err(), "expected `{pipes}` to be rejected");
    let diagnostic = &compiler.diagnostics().entries()[0];
    (diagnostic.category, diagnostic.message.clone())
}

/// Renders a resolved value as nested calls, e.g. `print(f(x))`.
fn shape(expression: &Expression) -> String {
    match &expression.kind {
        ExpressionKind::Identifier(identifier) => identifier.name.clone(),
        ExpressionKind::Literal(literal) => format!("{literal:?}"),
        ExpressionKind::Call(call) => format!(
            "{}({})",
            call.callee.name,
            call.arguments.iter().map(shape).collect::<Vec<_>>().join(", ")
        ),
        ExpressionKind::Access(access) => {
            format!("{}.{}", shape(&access.object), access.attribute.name)
        }
        ExpressionKind::Cast(cast) => format!("cast({})", shape(&cast.value)),
        other => format!("{other:?}"),
    }
}

fn sinks(plan: &PipePlan) -> Vec<String> {
    plan.chains
        .iter()
        .map(|head| {
            let sink = plan.chain(*head).last().expect("chain has a sink");
            assert_eq!(sink.operator, PipeOperator::Sink);
            sink.outputs.values().iter().map(shape).collect::<Vec<_>>().join("; ")
        })
        .collect()
}

#[test]
fn three_stage_pipe_feeds_each_stage_into_the_next() {
    let plan = plan("x --> f --> print");
    assert_eq!(plan.chains.len(), 1);
    let operators: Vec<_> = plan
        .chain(plan.chains[0])
        .map(|stage| stage.operator.clone())
        .collect();
    assert_eq!(
        operators,
        vec![PipeOperator::Inject, PipeOperator::Inject, PipeOperator::Sink]
    );
    assert_eq!(sinks(&plan), vec!["print(f(x))"]);
}

#[test]
fn reordering_stages_reorders_the_chain() {
    assert_eq!(sinks(&plan("x --> f --> g --> print")), vec!["print(g(f(x)))"]);
    assert_eq!(sinks(&plan("x --> g --> f --> print")), vec!["print(f(g(x)))"]);
}

#[test]
fn stage_links_point_both_ways() {
    let plan = plan("x --> f --> print");
    let head = plan.chains[0];
    let middle = plan.stage(head).next.expect("head links forward");
    assert_eq!(plan.stage(middle).prev, Some(head));
    let sink = plan.stage(middle).next.expect("middle links forward");
    assert_eq!(plan.stage(sink).prev, Some(middle));
    assert!(!plan.stage(sink).feeds_pipe);
}

#[test]
fn each_line_starts_a_new_chain() {
    let plan = plan("x --> print\nx --> f --> print");
    assert_eq!(sinks(&plan), vec!["print(x)", "print(f(x))"]);
}

#[test]
fn multiple_inputs_become_multiple_arguments() {
    let plan = plan("x, x --> add --> print");
    assert_eq!(sinks(&plan), vec!["print(add(x, x))"]);
}

#[test]
fn drain_projects_named_attributes() {
    let plan = plan("b -height-width-> print");
    let head = plan.stage(plan.chains[0]);
    assert_eq!(
        head.operator,
        PipeOperator::Drain(vec!["height".into(), "width".into()])
    );
    let PipeOutput::Drain { attributes, values } = &head.outputs else {
        panic!("expected drained outputs");
    };
    assert_eq!(attributes.len(), 2);
    assert!(values.iter().all(|value| value.ty == Some(Type::INT)));
    assert_eq!(sinks(&plan), vec!["print(b.height, b.width)"]);
}

#[test]
fn cast_converts_between_numbers_and_to_strings() {
    let plan = plan("x -(RAT)-> print\nx -(STR)-> print");
    let types: Vec<_> = plan
        .chains
        .iter()
        .map(|head| plan.stage(*head).outputs.values()[0].ty.clone())
        .collect();
    assert_eq!(types, vec![Some(Type::RAT), Some(Type::STR)]);
    assert_eq!(sinks(&plan), vec!["print(cast(x))", "print(cast(x))"]);
}

#[test]
fn cast_rejects_unconvertible_values() {
    let (category, message) = first_error("\"text\" -(INT)-> print");
    assert_eq!(category, Some(ErrorCategory::Type));
    assert_eq!(message, "Cannot cast STR to INT");

    let (_, message) = first_error("x -(f)-> print");
    assert_eq!(message, "Type expected");
}

#[test]
fn literal_fan_out_explodes_into_branches() {
    let plan = plan("||1, 2, 3|| --<( f --> print");
    assert_eq!(plan.chains.len(), 3);
    for head in &plan.chains {
        assert_eq!(plan.stage(*head).operator, PipeOperator::Inject);
    }
    let sinks = sinks(&plan);
    assert_eq!(sinks.len(), 3);
    assert!(sinks.iter().all(|sink| sink.starts_with("print(f(Integer(")));
}

#[test]
fn list_value_fan_out_spreads_at_run_time() {
    let plan = plan("k --<( f --> print");
    assert_eq!(plan.chains.len(), 1);
    let head = plan.stage(plan.chains[0]);
    let PipeOutput::Spread { source, item } = &head.outputs else {
        panic!("expected a spread stage");
    };
    assert_eq!(shape(source), "k");
    assert_eq!(item.ty, Some(Type::INT));
    assert_eq!(sinks(&plan), vec!["print(f(item))"]);
}

#[test]
fn fan_out_needs_a_single_list() {
    let (category, message) = first_error("k, k --<( print");
    assert_eq!(category, Some(ErrorCategory::Structural));
    assert_eq!(message, "Fan-out expects a single list input");

    let (category, message) = first_error("x --<( print");
    assert_eq!(category, Some(ErrorCategory::Type));
    assert_eq!(message, "Cannot fan out a INT");
}

#[test]
fn chained_inputs_must_be_callable() {
    let (category, message) = first_error("x --> x --> print");
    assert_eq!(category, Some(ErrorCategory::Type));
    assert_eq!(message, "Call of a non-function or non-constructor");
}

#[test]
fn chained_calls_check_arguments() {
    let (_, message) = first_error("x, x --> f --> print");
    assert_eq!(message, "Expected 1 arguments but got 2");
}

#[test]
fn rejects_unrecognized_operators() {
    let (category, message) = first_error("x -a--> print");
    assert_eq!(category, Some(ErrorCategory::Structural));
    assert_eq!(message, "Unrecognized pipe operator -a-->");
}
