mod analyzer;
mod ast;
mod compiler;
mod diagnostics;
mod error;
mod generator;
mod lexer;
mod optimizer;
mod parser;
mod scope;
mod source;
mod stdlib;
mod symbols;
mod types;

pub use crate::analyzer::{Analysis, Analyzer};
pub use crate::ast::{
    AccessExpression, AssignOperator, Assignment, AttributeDec, BinaryExpression, BinaryOperator,
    Block, CallExpression, CastExpression, Definitions, Expression, ExpressionKind,
    ExpressionStatement, ForStatement, FunctionDec, Identifier, IfStatement, ImportDec,
    IndexExpression, KeyValuePair, ListDec, ListExp, Literal, MapDec, MapExp, MethodDec,
    MethodExpression, PipeDec, PipeObj, PipeOperator, PipeOutput, PipePlan, PipeTarget, Pipelines,
    Program, PrototypeDec, ReturnStatement, SourceSpan, StageId, Statement, TypeAnnotation,
    TypeParameterPairDec, UnaryExpression, UnaryOperator, VariableDec, WhileStatement,
};
pub use crate::compiler::{Compilation, CompileOptions, Compiler};
pub use crate::diagnostics::{Diagnostic, DiagnosticLevel, Diagnostics};
pub use crate::error::{AnalysisResult, CompileError, ErrorCategory};
pub use crate::generator::{generate, JsGenerator};
pub use crate::lexer::{Keyword, Lexer, LexerError, Token, TokenKind};
pub use crate::optimizer::{fold_numeric, has_call, Optimizer, OptimizerOptions};
pub use crate::parser::Parser;
pub use crate::scope::{Scope, ScopeChain, ScopeOverrides};
pub use crate::source::{SourceFile, SourceId};
pub use crate::stdlib::{find_builtin, Builtin, BuiltinArity, BuiltinKind, BUILTINS};
pub use crate::symbols::{Signature, Symbol, SymbolId, SymbolKind, SymbolTable};
pub use crate::types::{
    is_assignable, is_castable, is_equivalent, PrimitiveKind, PrototypeTable, Type, UserType,
    UserTypeId,
};
