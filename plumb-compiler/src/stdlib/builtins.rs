use super::{builtin, primitive, Builtin, BuiltinArity, BuiltinKind};
use crate::types::PrimitiveKind;

/// Names visible in every program before any declaration.
pub const BUILTINS: &[Builtin] = &[
    primitive(PrimitiveKind::Integer),
    primitive(PrimitiveKind::Rational),
    primitive(PrimitiveKind::String),
    primitive(PrimitiveKind::Boolean),
    primitive(PrimitiveKind::DoesNotExist),
    builtin(
        "print",
        BuiltinKind::Function,
        BuiltinArity::Variadic,
        &[],
        PrimitiveKind::DoesNotExist,
        "console.log",
    ),
    builtin(
        "append",
        BuiltinKind::Method,
        BuiltinArity::Exact(1),
        &[PrimitiveKind::DoesNotExist],
        PrimitiveKind::DoesNotExist,
        "push",
    ),
];
