use std::collections::HashMap;

use crate::analyzer::Analysis;
use crate::ast::*;
use crate::stdlib::find_builtin;
use crate::symbols::{SymbolId, SymbolKind};
use crate::types::{PrimitiveKind, Type, UserTypeId};

const INDENT: &str = "    ";

// JavaScript operator precedence, higher binds tighter.
const PREC_OR: u8 = 3;
const PREC_AND: u8 = 4;
const PREC_EQUALITY: u8 = 8;
const PREC_RELATIONAL: u8 = 9;
const PREC_ADDITIVE: u8 = 11;
const PREC_MULTIPLICATIVE: u8 = 12;
const PREC_EXPONENT: u8 = 13;
const PREC_UNARY: u8 = 14;
const PREC_POSTFIX: u8 = 17;
const PREC_PRIMARY: u8 = 20;

/// Emits JavaScript for an analyzed (and usually optimized) program.
pub fn generate(program: &Program, analysis: &Analysis) -> String {
    let mut generator = JsGenerator::new(analysis);
    generator.emit_program(program);
    generator.finish()
}

pub struct JsGenerator<'a> {
    analysis: &'a Analysis,
    names: HashMap<SymbolId, String>,
    classes: HashMap<UserTypeId, SymbolId>,
    next_suffix: usize,
    output: String,
    indent: usize,
}

impl<'a> JsGenerator<'a> {
    pub fn new(analysis: &'a Analysis) -> Self {
        let classes = analysis
            .symbols
            .iter()
            .filter(|(_, symbol)| symbol.kind == SymbolKind::Prototype)
            .filter_map(|(id, symbol)| symbol.ty.user_id().map(|user_type| (user_type, id)))
            .collect();
        Self {
            analysis,
            names: HashMap::new(),
            classes,
            next_suffix: 0,
            output: String::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.output.push_str(INDENT);
        }
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn open(&mut self, text: &str) {
        self.line(text);
        self.indent += 1;
    }

    fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
        self.line("}");
    }

    /// Target name for a symbol, numbered on first use.
    fn symbol_name(&mut self, id: SymbolId) -> String {
        if let Some(name) = self.names.get(&id) {
            return name.clone();
        }
        let symbol = self.analysis.symbols.get(id);
        let name = if symbol.builtin {
            match find_builtin(&symbol.name) {
                Some(builtin) if !builtin.target.is_empty() => builtin.target.to_string(),
                _ => symbol.name.clone(),
            }
        } else {
            self.next_suffix += 1;
            format!("{}_{}", symbol.name, self.next_suffix)
        };
        self.names.insert(id, name.clone());
        name
    }

    fn identifier_name(&mut self, identifier: &Identifier) -> String {
        match identifier.symbol {
            Some(id) => self.symbol_name(id),
            None => identifier.name.clone(),
        }
    }

    fn class_name(&mut self, user_type: UserTypeId) -> String {
        match self.classes.get(&user_type).copied() {
            Some(id) => self.symbol_name(id),
            None => self.analysis.prototypes.get(user_type).name.clone(),
        }
    }

    pub fn emit_program(&mut self, program: &Program) {
        for import in &program.imports {
            let line = format!("import {};", quote(&import.path));
            self.line(&line);
        }
        if let Some(definitions) = &program.definitions {
            self.emit_statements(&definitions.block.statements);
        }
        if let Some(pipelines) = &program.pipelines {
            self.emit_pipelines(&pipelines.plan);
        }
    }

    fn emit_statements(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.emit_statement(statement);
        }
    }

    fn emit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Variable(_)
            | Statement::List(_)
            | Statement::Map(_)
            | Statement::Assignment(_)
            | Statement::Expression(_) => {
                let text = format!("{};", self.simple_statement(statement));
                self.line(&text);
            }
            Statement::Function(dec) => {
                let name = self.identifier_name(&dec.name);
                let parameters = self.parameters(&dec.parameters);
                self.open(&format!("function {name}({parameters}) {{"));
                self.emit_statements(&dec.body.statements);
                self.close();
            }
            Statement::Prototype(dec) => self.emit_class(dec),
            Statement::Attribute(dec) => {
                let name = self.identifier_name(&dec.name);
                let text = match &dec.value {
                    Some(value) => format!("{name} = {};", self.expression(value)),
                    None => format!("{name};"),
                };
                self.line(&text);
            }
            Statement::Method(dec) => {
                let name = self.identifier_name(&dec.name);
                let parameters = self.parameters(&dec.parameters);
                self.open(&format!("{name}({parameters}) {{"));
                self.emit_statements(&dec.body.statements);
                self.close();
            }
            Statement::If(statement) => {
                let condition = self.expression(&statement.condition);
                self.open(&format!("if ({condition}) {{"));
                self.emit_statements(&statement.body.statements);
                self.close();
            }
            Statement::While(statement) => {
                let condition = self.expression(&statement.condition);
                self.open(&format!("while ({condition}) {{"));
                self.emit_statements(&statement.body.statements);
                self.close();
            }
            Statement::For(statement) => {
                let initializer = self.simple_statement(&statement.initializer);
                let condition = self.expression(&statement.condition);
                let step = self.simple_statement(&statement.step);
                self.open(&format!("for ({initializer}; {condition}; {step}) {{"));
                self.emit_statements(&statement.body.statements);
                self.close();
            }
            Statement::Return(statement) => {
                let text = match &statement.value {
                    Some(value) => format!("return {};", self.expression(value)),
                    None => "return;".to_string(),
                };
                self.line(&text);
            }
            Statement::Break(_) => self.line("break;"),
            Statement::Continue(_) => self.line("continue;"),
        }
    }

    /// Prototype bodies become classes. Functions other than the constructor
    /// are emitted ahead of the class as plain functions.
    fn emit_class(&mut self, dec: &PrototypeDec) {
        for statement in &dec.body.statements {
            if let Statement::Function(function) = statement {
                if !function.is_constructor {
                    self.emit_statement(statement);
                }
            }
        }

        let name = self.identifier_name(&dec.name);
        self.open(&format!("class {name} {{"));
        for statement in &dec.body.statements {
            match statement {
                Statement::Function(function) if function.is_constructor => {
                    let parameters = self.parameters(&function.parameters);
                    self.open(&format!("constructor({parameters}) {{"));
                    self.emit_statements(&function.body.statements);
                    self.close();
                }
                Statement::Function(_) => {}
                other => self.emit_statement(other),
            }
        }
        self.close();
    }

    /// Statements that can sit inside a `for` header, without the semicolon.
    fn simple_statement(&mut self, statement: &Statement) -> String {
        match statement {
            Statement::Variable(VariableDec { name, value, .. })
            | Statement::List(ListDec { name, value, .. })
            | Statement::Map(MapDec { name, value, .. }) => {
                let name = self.identifier_name(name);
                format!("let {name} = {}", self.expression(value))
            }
            Statement::Assignment(assignment) => {
                let target = self.identifier_name(&assignment.target);
                let target = if assignment.is_self {
                    format!("this.{target}")
                } else {
                    target
                };
                let operator = assign_operator(assignment.operator);
                format!("{target} {operator} {}", self.expression(&assignment.value))
            }
            Statement::Expression(statement) => self.expression(&statement.expression),
            _ => String::new(),
        }
    }

    fn parameters(&mut self, parameters: &[TypeParameterPairDec]) -> String {
        parameters
            .iter()
            .map(|parameter| self.identifier_name(&parameter.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn emit_pipelines(&mut self, plan: &PipePlan) {
        for head in &plan.chains {
            self.emit_chain(plan, *head);
        }
    }

    /// One statement per chain: the sink call, wrapped in a loop for every
    /// spread stage on the way.
    fn emit_chain(&mut self, plan: &PipePlan, head: StageId) {
        let mut loops = 0;
        for stage in plan.chain(head) {
            match (&stage.operator, &stage.outputs) {
                (_, PipeOutput::Spread { source, item }) => {
                    let item = self.expression(item);
                    let source = self.expression(source);
                    self.open(&format!("for (const {item} of {source}) {{"));
                    loops += 1;
                }
                (PipeOperator::Sink, outputs) => {
                    for value in outputs.values() {
                        let text = format!("{};", self.expression(&value));
                        self.line(&text);
                    }
                }
                _ => {}
            }
        }
        for _ in 0..loops {
            self.close();
        }
    }

    pub fn expression(&mut self, expression: &Expression) -> String {
        self.render(expression).0
    }

    fn wrap(&mut self, expression: &Expression, min: u8) -> String {
        let (text, precedence) = self.render(expression);
        if precedence < min {
            format!("({text})")
        } else {
            text
        }
    }

    fn render(&mut self, expression: &Expression) -> (String, u8) {
        match &expression.kind {
            ExpressionKind::Literal(literal) => render_literal(literal),
            ExpressionKind::Identifier(identifier) => {
                (self.identifier_name(identifier), PREC_PRIMARY)
            }
            ExpressionKind::SelfRef => ("this".to_string(), PREC_PRIMARY),
            ExpressionKind::Binary(binary) => {
                let (operator, precedence) = binary_operator(binary.operator);
                let (left_min, right_min) = if binary.operator == BinaryOperator::Power {
                    // A unary operand on the left of `**` is a syntax error.
                    (PREC_UNARY + 1, precedence)
                } else {
                    (precedence, precedence + 1)
                };
                let left = self.wrap(&binary.left, left_min);
                let right = self.wrap(&binary.right, right_min);
                (format!("{left} {operator} {right}"), precedence)
            }
            ExpressionKind::Unary(unary) => {
                let operand = self.wrap(&unary.operand, PREC_UNARY);
                let text = match unary.operator {
                    UnaryOperator::Not => format!("!{operand}"),
                    UnaryOperator::Negate if operand.starts_with('-') => format!("-({operand})"),
                    UnaryOperator::Negate => format!("-{operand}"),
                };
                (text, PREC_UNARY)
            }
            ExpressionKind::Index(index) => {
                let object = self.wrap(&index.object, PREC_POSTFIX);
                let key = self.expression(&index.index);
                let text = match index.object.ty {
                    Some(Type::MapOf(_)) => format!("{object}.get({key})"),
                    _ => format!("{object}[{key}]"),
                };
                (text, PREC_POSTFIX)
            }
            ExpressionKind::Access(access) => {
                let object = self.wrap(&access.object, PREC_POSTFIX);
                let attribute = self.identifier_name(&access.attribute);
                (format!("{object}.{attribute}"), PREC_POSTFIX)
            }
            ExpressionKind::Method(method) => {
                let object = self.wrap(&method.object, PREC_POSTFIX);
                let name = self.identifier_name(&method.method);
                let arguments = self.arguments(&method.arguments);
                (format!("{object}.{name}({arguments})"), PREC_POSTFIX)
            }
            ExpressionKind::Call(call) => {
                let arguments = self.arguments(&call.arguments);
                let text = match self.constructed_type(&call.callee) {
                    Some(user_type) => {
                        format!("new {}({arguments})", self.class_name(user_type))
                    }
                    None => format!("{}({arguments})", self.identifier_name(&call.callee)),
                };
                (text, PREC_POSTFIX)
            }
            ExpressionKind::List(list) => {
                let elements = self.arguments(&list.elements);
                (format!("[{elements}]"), PREC_PRIMARY)
            }
            ExpressionKind::Map(map) => {
                let entries = map
                    .entries
                    .iter()
                    .map(|entry| {
                        let key = self.expression(&entry.key);
                        let value = self.expression(&entry.value);
                        format!("[{key}, {value}]")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                (format!("new Map([{entries}])"), PREC_POSTFIX)
            }
            ExpressionKind::Cast(cast) => self.render_cast(cast),
        }
    }

    fn arguments(&mut self, arguments: &[Expression]) -> String {
        arguments
            .iter()
            .map(|argument| self.expression(argument))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The user type a call constructs, if the callee is a prototype or its
    /// constructor.
    fn constructed_type(&self, callee: &Identifier) -> Option<UserTypeId> {
        let symbol = self.analysis.symbols.get(callee.symbol?);
        match symbol.kind {
            SymbolKind::Prototype => symbol.ty.user_id(),
            SymbolKind::Function => symbol.constructor_of,
            _ => None,
        }
    }

    fn render_cast(&mut self, cast: &CastExpression) -> (String, u8) {
        let source = cast.value.ty.clone().unwrap_or(Type::DNE);
        let wrapper = match (&source, &cast.target) {
            (from, to) if from == to => None,
            (_, Type::Primitive(PrimitiveKind::Integer)) => Some("Math.trunc"),
            (Type::Primitive(PrimitiveKind::Integer), Type::Primitive(PrimitiveKind::Rational)) => {
                None
            }
            (_, Type::Primitive(PrimitiveKind::Rational)) => Some("Number"),
            (_, Type::Primitive(PrimitiveKind::String)) => Some("String"),
            _ => None,
        };
        match wrapper {
            Some(function) => {
                let value = self.expression(&cast.value);
                (format!("{function}({value})"), PREC_POSTFIX)
            }
            None => self.render(&cast.value),
        }
    }
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

fn render_literal(literal: &Literal) -> (String, u8) {
    match literal {
        Literal::Integer(value) => {
            let precedence = if value.sign() == num_bigint::Sign::Minus {
                PREC_UNARY
            } else {
                PREC_PRIMARY
            };
            (value.to_string(), precedence)
        }
        Literal::Rational(value) => {
            let precedence = if value.is_sign_negative() {
                PREC_UNARY
            } else {
                PREC_PRIMARY
            };
            (value.to_string(), precedence)
        }
        Literal::String(value) => (quote(value), PREC_PRIMARY),
        Literal::Boolean(value) => (value.to_string(), PREC_PRIMARY),
        Literal::Null => ("null".to_string(), PREC_PRIMARY),
        Literal::Undefined => ("undefined".to_string(), PREC_PRIMARY),
    }
}

fn binary_operator(operator: BinaryOperator) -> (&'static str, u8) {
    match operator {
        BinaryOperator::Or => ("||", PREC_OR),
        BinaryOperator::And => ("&&", PREC_AND),
        BinaryOperator::Equal => ("===", PREC_EQUALITY),
        BinaryOperator::NotEqual => ("!==", PREC_EQUALITY),
        BinaryOperator::Less => ("<", PREC_RELATIONAL),
        BinaryOperator::LessEqual => ("<=", PREC_RELATIONAL),
        BinaryOperator::Greater => (">", PREC_RELATIONAL),
        BinaryOperator::GreaterEqual => (">=", PREC_RELATIONAL),
        BinaryOperator::Add => ("+", PREC_ADDITIVE),
        BinaryOperator::Subtract => ("-", PREC_ADDITIVE),
        BinaryOperator::Multiply => ("*", PREC_MULTIPLICATIVE),
        BinaryOperator::Divide => ("/", PREC_MULTIPLICATIVE),
        BinaryOperator::Modulo => ("%", PREC_MULTIPLICATIVE),
        BinaryOperator::Power => ("**", PREC_EXPONENT),
    }
}

fn assign_operator(operator: AssignOperator) -> &'static str {
    match operator {
        AssignOperator::Assign => "=",
        AssignOperator::AddAssign => "+=",
        AssignOperator::SubtractAssign => "-=",
        AssignOperator::MultiplyAssign => "*=",
        AssignOperator::DivideAssign => "/=",
        AssignOperator::ModuloAssign => "%=",
        AssignOperator::PowerAssign => "**=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_quoted_for_javascript() {
        assert_eq!(quote("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn negative_literals_bind_like_unary_minus() {
        let (text, precedence) = render_literal(&Literal::Rational(-0.5));
        assert_eq!(text, "-0.5");
        assert_eq!(precedence, PREC_UNARY);
    }
}
