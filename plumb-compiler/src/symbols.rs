use crate::ast::SourceSpan;
use crate::types::{Type, UserTypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    Method,
    Attribute,
    /// A type name: a primitive or a `PROTO` declaration.
    Prototype,
}

impl SymbolKind {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Attribute => "attribute",
            SymbolKind::Prototype => "prototype",
        }
    }
}

/// Parameter list of a function or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub parameters: Vec<Type>,
    pub variadic: bool,
}

impl Signature {
    pub fn fixed(parameters: Vec<Type>) -> Self {
        Self {
            parameters,
            variadic: false,
        }
    }

    pub fn variadic() -> Self {
        Self {
            parameters: Vec::new(),
            variadic: true,
        }
    }
}

/// A declared entity. For functions and methods `ty` is the return type,
/// for prototypes it is the type itself.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub span: SourceSpan,
    pub signature: Option<Signature>,
    pub constructor_of: Option<UserTypeId>,
    pub builtin: bool,
}

impl Symbol {
    pub fn new<S: Into<String>>(name: S, kind: SymbolKind, ty: Type, span: SourceSpan) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            span,
            signature: None,
            constructor_of: None,
            builtin: false,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Arena owning every symbol created during one analysis run.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (SymbolId(index as u32), symbol))
    }
}
