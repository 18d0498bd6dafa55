use std::fmt;

use num_bigint::BigInt;

use crate::symbols::SymbolId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceSpan {
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl SourceSpan {
    pub fn new(line: usize, column: usize, end_line: usize, end_column: usize) -> Self {
        Self {
            line,
            column,
            end_line,
            end_column,
        }
    }

    pub fn union(a: &Self, b: &Self) -> Self {
        if a.line == 0 {
            return *b;
        }
        if b.line == 0 {
            return *a;
        }

        let (start_line, start_column) =
            if (a.line, a.column) <= (b.line, b.column) {
                (a.line, a.column)
            } else {
                (b.line, b.column)
            };

        let (end_line, end_column) = if (a.end_line, a.end_column) >= (b.end_line, b.end_column)
        {
            (a.end_line, a.end_column)
        } else {
            (b.end_line, b.end_column)
        };

        Self::new(start_line, start_column, end_line, end_column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub imports: Vec<ImportDec>,
    pub definitions: Option<Definitions>,
    pub pipelines: Option<Pipelines>,
}

#[derive(Debug, Clone)]
pub struct ImportDec {
    pub path: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub struct Definitions {
    pub block: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

/// A name occurrence. `symbol` is filled in by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: SourceSpan,
    pub symbol: Option<SymbolId>,
}

impl Identifier {
    pub fn new<S: Into<String>>(name: S, span: SourceSpan) -> Self {
        Self {
            name: name.into(),
            span,
            symbol: None,
        }
    }
}

/// A type as written in source: `INT`, `BOX`, `||T||` or `<<T>>`.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeAnnotation {
    Named(Identifier),
    List(Box<TypeAnnotation>, SourceSpan),
    Map(Box<TypeAnnotation>, SourceSpan),
}

impl TypeAnnotation {
    pub fn span(&self) -> SourceSpan {
        match self {
            TypeAnnotation::Named(identifier) => identifier.span,
            TypeAnnotation::List(_, span) | TypeAnnotation::Map(_, span) => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Variable(VariableDec),
    List(ListDec),
    Map(MapDec),
    Assignment(Assignment),
    Function(FunctionDec),
    Prototype(PrototypeDec),
    Attribute(AttributeDec),
    Method(MethodDec),
    If(IfStatement),
    While(WhileStatement),
    For(ForStatement),
    Return(ReturnStatement),
    Break(SourceSpan),
    Continue(SourceSpan),
    Expression(ExpressionStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDec {
    pub ty: TypeAnnotation,
    pub name: Identifier,
    pub value: Expression,
}

/// `||T|| name <== value`
#[derive(Debug, Clone, PartialEq)]
pub struct ListDec {
    pub element: TypeAnnotation,
    pub name: Identifier,
    pub value: Expression,
}

/// `<<T>> name <== value`
#[derive(Debug, Clone, PartialEq)]
pub struct MapDec {
    pub element: TypeAnnotation,
    pub name: Identifier,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOperator {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    PowerAssign,
}

impl AssignOperator {
    pub fn spelling(self) -> &'static str {
        match self {
            AssignOperator::Assign => "<==",
            AssignOperator::AddAssign => "<++",
            AssignOperator::SubtractAssign => "<--",
            AssignOperator::MultiplyAssign => "<**",
            AssignOperator::DivideAssign => "<//",
            AssignOperator::ModuloAssign => "<%%",
            AssignOperator::PowerAssign => "<^^",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// `self.name <== ...` when set.
    pub is_self: bool,
    pub target: Identifier,
    pub operator: AssignOperator,
    pub value: Expression,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeParameterPairDec {
    pub ty: TypeAnnotation,
    pub name: Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDec {
    pub return_type: TypeAnnotation,
    pub name: Identifier,
    pub parameters: Vec<TypeParameterPairDec>,
    pub body: Block,
    /// Set by the analyzer on the first function of a prototype body.
    pub is_constructor: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrototypeDec {
    pub name: Identifier,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDec {
    pub ty: TypeAnnotation,
    pub name: Identifier,
    pub value: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDec {
    pub return_type: TypeAnnotation,
    pub name: Identifier,
    pub parameters: Vec<TypeParameterPairDec>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub condition: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub condition: Expression,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub initializer: Box<Statement>,
    pub condition: Expression,
    pub step: Box<Statement>,
    pub body: Block,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub value: Option<Expression>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(BigInt),
    Rational(f64),
    String(String),
    Boolean(bool),
    /// `none`
    Null,
    /// `all`
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
}

impl BinaryOperator {
    pub fn spelling(self) -> &'static str {
        match self {
            BinaryOperator::Or => "or",
            BinaryOperator::And => "and",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Less
                | BinaryOperator::LessEqual
                | BinaryOperator::Greater
                | BinaryOperator::GreaterEqual
        )
    }
}

/// An expression node. `ty` is attached by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub span: SourceSpan,
    pub kind: ExpressionKind,
    pub ty: Option<Type>,
}

impl Expression {
    pub fn new(span: SourceSpan, kind: ExpressionKind) -> Self {
        Self {
            span,
            kind,
            ty: None,
        }
    }

    pub fn typed(span: SourceSpan, kind: ExpressionKind, ty: Type) -> Self {
        Self {
            span,
            kind,
            ty: Some(ty),
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExpressionKind::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.as_literal() {
            Some(Literal::Boolean(value)) => Some(*value),
            _ => None,
        }
    }

    /// The resolved symbol of a bare identifier.
    pub fn symbol(&self) -> Option<SymbolId> {
        match &self.kind {
            ExpressionKind::Identifier(identifier) => identifier.symbol,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Identifier(Identifier),
    Literal(Literal),
    SelfRef,
    Binary(BinaryExpression),
    Unary(UnaryExpression),
    Index(IndexExpression),
    Access(AccessExpression),
    Method(MethodExpression),
    Call(CallExpression),
    List(ListExp),
    Map(MapExp),
    /// Only produced by cast pipes.
    Cast(CastExpression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpression {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessExpression {
    pub object: Box<Expression>,
    pub attribute: Identifier,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodExpression {
    pub object: Box<Expression>,
    pub method: Identifier,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub callee: Identifier,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExp {
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapExp {
    pub entries: Vec<KeyValuePair>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValuePair {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastExpression {
    pub value: Box<Expression>,
    pub target: Type,
}

#[derive(Debug, Clone)]
pub struct Pipelines {
    pub pipes: Vec<PipeDec>,
    /// Resolved execution plan, filled in by the analyzer.
    pub plan: PipePlan,
    pub span: SourceSpan,
}

/// One declared stage: `inputs OPERATOR next`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeDec {
    pub inputs: Vec<Expression>,
    pub operator: String,
    pub operator_span: SourceSpan,
    pub next: PipeTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipeTarget {
    Pipe(Box<PipeDec>),
    /// The terminal consumer, e.g. `print`.
    Sink(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeOperator {
    /// `-->`
    Inject,
    /// `-a-b->`
    Drain(Vec<String>),
    /// `--<(`
    FanOut,
    /// `-(T)->`
    Cast(String),
    /// The terminal consumer of a chain.
    Sink,
}

impl fmt::Display for PipeOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeOperator::Inject => f.write_str("-->"),
            PipeOperator::Drain(names) => write!(f, "-{}->", names.join("-")),
            PipeOperator::FanOut => f.write_str("--<("),
            PipeOperator::Cast(name) => write!(f, "-({name})->"),
            PipeOperator::Sink => f.write_str("sink"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipeOutput {
    Values(Vec<Expression>),
    Drain {
        attributes: Vec<SymbolId>,
        values: Vec<Expression>,
    },
    /// Runtime fan-out over a list value; downstream stages see `item`.
    Spread {
        source: Expression,
        item: Expression,
    },
}

impl PipeOutput {
    /// The values handed to the next stage.
    pub fn values(&self) -> Vec<Expression> {
        match self {
            PipeOutput::Values(values) | PipeOutput::Drain { values, .. } => values.clone(),
            PipeOutput::Spread { item, .. } => vec![item.clone()],
        }
    }
}

/// A resolved stage. `prev`/`next` index into the owning [`PipePlan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipeObj {
    pub inputs: Vec<Expression>,
    pub operator: PipeOperator,
    pub outputs: PipeOutput,
    pub prev: Option<StageId>,
    pub next: Option<StageId>,
    /// False only for sinks; a following stage chains onto this one when set.
    pub feeds_pipe: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipePlan {
    pub stages: Vec<PipeObj>,
    /// Head stage of every resolved chain, in declaration order.
    pub chains: Vec<StageId>,
}

impl PipePlan {
    pub fn push(&mut self, stage: PipeObj) -> StageId {
        self.stages.push(stage);
        StageId(self.stages.len() - 1)
    }

    pub fn stage(&self, id: StageId) -> &PipeObj {
        &self.stages[id.0]
    }

    pub fn stage_mut(&mut self, id: StageId) -> &mut PipeObj {
        &mut self.stages[id.0]
    }

    /// Walks a chain from its head to its sink.
    pub fn chain(&self, head: StageId) -> impl Iterator<Item = &PipeObj> + '_ {
        let mut cursor = Some(head);
        std::iter::from_fn(move || {
            let id = cursor?;
            let stage = self.stage(id);
            cursor = stage.next;
            Some(stage)
        })
    }
}
