use std::path::PathBuf;

use plumb_compiler::{
    CompileOptions, Compiler, ErrorCategory, SourceFile, SourceId, Statement, Type,
};

fn compile(name: &str, source: &str) -> (Compiler, anyhow::Result<plumb_compiler::Compilation>) {
    let mut compiler = Compiler::new(CompileOptions {
        optimize: false,
        ..CompileOptions::default()
    });
    let source_file = SourceFile::new(SourceId(0), PathBuf::from(name), source.to_string());
    let result = compiler.compile(&source_file);
    (compiler, result)
}

fn expect_error(name: &str, source: &str, category: ErrorCategory, expected: &str) {
    let (compiler, result) = compile(name, source);
    assert!(result.is_err(), "expected {name} to fail analysis");
    let messages: Vec<_> = compiler
        .diagnostics()
        .entries()
        .iter()
        .map(|d| (d.category, d.message.as_str()))
        .collect();
    assert_eq!(
        messages,
        vec![(Some(category), expected)],
        "unexpected diagnostics for {name}"
    );
}

fn expect_type_error(name: &str, source: &str, expected: &str) {
    expect_error(name, source, ErrorCategory::Type, expected);
}

#[test]
fn declared_integer_flows_into_arithmetic() {
    let (compiler, result) = compile(
        "arith.plumb",
        "Definitions{\nINT x <== 1\nINT y <== x + 1\n}\n",
    );
    let compilation = result.unwrap_or_else(|err| {
        panic!("{err:?}: {:?}", compiler.diagnostics().entries());
    });
    let statements = &compilation
        .program
        .definitions
        .as_ref()
        .expect("definitions")
        .block
        .statements;
    let Statement::Variable(dec) = &statements[1] else {
        panic!("expected a variable declaration");
    };
    assert_eq!(dec.value.ty, Some(Type::INT));
    let symbol = dec.name.symbol.expect("y is bound");
    assert_eq!(compilation.analysis.symbols.get(symbol).ty, Type::INT);
}

#[test]
fn rejects_mismatched_declaration() {
    expect_type_error(
        "mismatch.plumb",
        "Definitions{\nINT flag <== true\n}\n",
        "Cannot assign a BOOL to a INT",
    );
}

#[test]
fn dne_accepts_anything() {
    let (_, result) = compile(
        "dne.plumb",
        "Definitions{\nDNE anything <== \"text\"\nINT n <== none\n}\n",
    );
    assert!(result.is_ok());
}

#[test]
fn rejects_non_boolean_condition() {
    expect_type_error(
        "condition.plumb",
        "Definitions{\nif(1){\n}\n}\n",
        "Expected a boolean",
    );
}

#[test]
fn rejects_mixed_numeric_operands() {
    expect_type_error(
        "mixed.plumb",
        "Definitions{\nRAT x <== 1 + 2.5\n}\n",
        "Operands not of equivalent type",
    );
}

#[test]
fn rejects_string_arithmetic() {
    expect_type_error(
        "string_math.plumb",
        "Definitions{\nINT x <== 1 * \"a\"\n}\n",
        "Expected a number",
    );
}

#[test]
fn list_index_must_be_an_integer() {
    let (_, result) = compile(
        "index_ok.plumb",
        "Definitions{\n||INT|| k <== ||1, 2, 3||\nINT first <== k[0]\n}\n",
    );
    assert!(result.is_ok());

    expect_type_error(
        "index_bad.plumb",
        "Definitions{\n||INT|| k <== ||1, 2, 3||\nINT first <== k[\"a\"]\n}\n",
        "List index must be an integer",
    );
}

#[test]
fn map_key_must_be_a_string() {
    let (_, result) = compile(
        "map_ok.plumb",
        "Definitions{\n<<BOOL>> m <== <<\"hasCar\": true>>\nBOOL car <== m[\"hasCar\"]\n}\n",
    );
    assert!(result.is_ok());

    expect_type_error(
        "map_bad.plumb",
        "Definitions{\n<<BOOL>> m <== <<\"hasCar\": true>>\nBOOL car <== m[0]\n}\n",
        "Map key must be a string",
    );
}

#[test]
fn rejects_mixed_list_elements() {
    expect_type_error(
        "list_mixed.plumb",
        "Definitions{\n||INT|| k <== ||1, \"two\"||\n}\n",
        "Elements in list not all of same type",
    );
}

#[test]
fn rejects_mixed_map_values() {
    expect_type_error(
        "map_mixed.plumb",
        "Definitions{\n<<INT>> m <== <<\"a\": 1, \"b\": true>>\n}\n",
        "Values in map not all of same type",
    );
}

#[test]
fn rejects_calling_a_variable() {
    expect_type_error(
        "call_variable.plumb",
        "Definitions{\nINT x <== 1\nINT y <== x()\n}\n",
        "Call of a non-function or non-constructor",
    );
}

#[test]
fn checks_call_arity() {
    expect_type_error(
        "arity.plumb",
        "Definitions{\nINT FUNC f(INT a){\nreturn a\n}\nINT y <== f(1, 2)\n}\n",
        "Expected 1 arguments but got 2",
    );
}

#[test]
fn checks_argument_types() {
    expect_type_error(
        "argument.plumb",
        "Definitions{\nINT FUNC f(INT a){\nreturn a\n}\nINT y <== f(\"one\")\n}\n",
        "Cannot assign a STR to a INT",
    );
}

#[test]
fn print_is_variadic() {
    let (_, result) = compile(
        "print.plumb",
        "Definitions{\nprint()\nprint(1, \"two\", true)\n}\n",
    );
    assert!(result.is_ok());
}

#[test]
fn checks_return_type() {
    expect_type_error(
        "return_type.plumb",
        "Definitions{\nINT FUNC f(){\nreturn \"s\"\n}\n}\n",
        "Cannot assign a STR to a INT",
    );
}

#[test]
fn rejects_return_outside_function() {
    expect_error(
        "return_outside.plumb",
        "Definitions{\nreturn 1\n}\n",
        ErrorCategory::Structural,
        "Return can only appear in a function",
    );
}

#[test]
fn rejects_plain_for_step() {
    expect_error(
        "for_step.plumb",
        "Definitions{\nfor(INT i <== 0 : i < 3 : i <== i + 1){\n}\n}\n",
        ErrorCategory::Structural,
        "Not an incrementing assignment statement",
    );
}

#[test]
fn rejects_continue_outside_loop() {
    expect_error(
        "continue.plumb",
        "Definitions{\nif(true){\ncontinue\n}\n}\n",
        ErrorCategory::Structural,
        "continue can only appear in a loop",
    );
}

#[test]
fn rejects_statements_in_prototype_body() {
    expect_error(
        "proto_body.plumb",
        "Definitions{\nPROTO BOX{\nINT x <== 1\n}\n}\n",
        ErrorCategory::Structural,
        "Only attributes, methods, and a constructor may appear in a prototype",
    );
}

#[test]
fn rejects_attributes_outside_prototype() {
    expect_error(
        "stray_attribute.plumb",
        "Definitions{\nATR INT volume\n}\n",
        ErrorCategory::Structural,
        "Attributes can only appear in a prototype",
    );
}

#[test]
fn rejects_assigning_to_a_function() {
    expect_type_error(
        "assign_function.plumb",
        "Definitions{\nINT FUNC f(){\nreturn 1\n}\nf <== 2\n}\n",
        "Cannot assign to function f",
    );
}

#[test]
fn add_assign_requires_number_or_string() {
    let (_, result) = compile(
        "concat.plumb",
        "Definitions{\nSTR s <== \"a\"\ns <++ \"b\"\n}\n",
    );
    assert!(result.is_ok());

    expect_type_error(
        "bool_add.plumb",
        "Definitions{\nBOOL b <== true\nb <++ true\n}\n",
        "Expected a number or string",
    );
}

#[test]
fn constructor_checks_arguments() {
    let source = "Definitions{\nPROTO BOX{\nATR INT volume\nBOX FUNC BOX(INT volume){\nself.volume <== volume\n}\n}\nBOX b <== BOX(\"big\")\n}\n";
    expect_type_error("constructor.plumb", source, "Cannot assign a STR to a INT");
}

#[test]
fn methods_resolve_on_their_type() {
    let source = "Definitions{\nPROTO BOX{\nATR INT volume <== 2\nATR INT FUNC doubled(){\nreturn self.volume * 2\n}\n}\nBOX b <== BOX()\nINT d <== b.doubled()\n}\n";
    let (compiler, result) = compile("method.plumb", source);
    assert!(result.is_ok(), "{:?}", compiler.diagnostics().entries());
}

#[test]
fn append_checks_list_element_type() {
    let (_, result) = compile(
        "append_ok.plumb",
        "Definitions{\n||INT|| k <== ||||\nk.append(1)\n}\n",
    );
    assert!(result.is_ok());

    expect_type_error(
        "append_bad.plumb",
        "Definitions{\n||INT|| k <== ||1||\nk.append(\"s\")\n}\n",
        "Cannot assign a STR to a INT",
    );
}

#[test]
fn append_requires_a_list_receiver() {
    expect_type_error(
        "append_int.plumb",
        "Definitions{\nINT x <== 1\nx.append(2)\n}\n",
        "INT has no method append",
    );
    expect_type_error(
        "append_box.plumb",
        "Definitions{\nPROTO BOX{\nATR INT v\n}\nBOX b <== BOX()\nb.append(2)\n}\n",
        "BOX has no method append",
    );
}

#[test]
fn rejects_calling_a_function_as_method() {
    expect_type_error(
        "not_method.plumb",
        "Definitions{\n||INT|| k <== ||1||\nk.print(1)\n}\n",
        "print is not a method",
    );
}
