mod builtins;

pub use builtins::BUILTINS;

use crate::types::PrimitiveKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// One of the five primitive type names.
    Prototype(PrimitiveKind),
    Function,
    /// Callable with receiver syntax, `list.append(x)`.
    Method,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinArity {
    Exact(usize),
    Variadic,
}

/// An entry of the root-scope seed.
#[derive(Clone, Copy, Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub kind: BuiltinKind,
    pub arity: BuiltinArity,
    pub params: &'static [PrimitiveKind],
    pub return_type: PrimitiveKind,
    /// Spelling in emitted JavaScript.
    pub target: &'static str,
}

pub(crate) const fn builtin(
    name: &'static str,
    kind: BuiltinKind,
    arity: BuiltinArity,
    params: &'static [PrimitiveKind],
    return_type: PrimitiveKind,
    target: &'static str,
) -> Builtin {
    Builtin {
        name,
        kind,
        arity,
        params,
        return_type,
        target,
    }
}

pub(crate) const fn primitive(kind: PrimitiveKind) -> Builtin {
    builtin(
        kind.name(),
        BuiltinKind::Prototype(kind),
        BuiltinArity::Exact(0),
        &[],
        kind,
        "",
    )
}

pub fn find_builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_contains_primitives_and_io() {
        for name in ["INT", "RAT", "STR", "BOOL", "DNE", "print", "append"] {
            assert!(find_builtin(name).is_some(), "missing builtin {name}");
        }
        assert!(find_builtin("println").is_none());
    }

    #[test]
    fn print_is_variadic() {
        let print = find_builtin("print").unwrap();
        assert_eq!(print.arity, BuiltinArity::Variadic);
        assert_eq!(print.target, "console.log");
    }
}
