use std::collections::HashMap;

use crate::ast::{SourceSpan, StageId};
use crate::error::{AnalysisResult, CompileError};
use crate::stdlib::{Builtin, BuiltinArity, BuiltinKind};
use crate::symbols::{Signature, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::types::{Type, UserTypeId};

/// One lexical level. Everything except `names` is inherited from the parent
/// when the child is created.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: HashMap<String, SymbolId>,
    pub in_loop: bool,
    pub function: Option<SymbolId>,
    pub prototype: Option<UserTypeId>,
    pub has_constructor: bool,
    pub prev_pipe: Option<StageId>,
}

impl Scope {
    fn child(&self, overrides: ScopeOverrides) -> Self {
        Self {
            names: HashMap::new(),
            in_loop: overrides.in_loop.unwrap_or(self.in_loop),
            function: overrides.function.unwrap_or(self.function),
            prototype: overrides.prototype.unwrap_or(self.prototype),
            has_constructor: overrides.has_constructor.unwrap_or(self.has_constructor),
            prev_pipe: overrides.prev_pipe.unwrap_or(self.prev_pipe),
        }
    }

    pub fn get(&self, name: &str) -> Option<SymbolId> {
        self.names.get(name).copied()
    }
}

/// Fields a new child scope sets instead of inheriting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeOverrides {
    in_loop: Option<bool>,
    function: Option<Option<SymbolId>>,
    prototype: Option<Option<UserTypeId>>,
    has_constructor: Option<bool>,
    prev_pipe: Option<Option<StageId>>,
}

impl ScopeOverrides {
    pub fn in_loop(mut self, value: bool) -> Self {
        self.in_loop = Some(value);
        self
    }

    pub fn function(mut self, value: Option<SymbolId>) -> Self {
        self.function = Some(value);
        self
    }

    pub fn prototype(mut self, value: Option<UserTypeId>) -> Self {
        self.prototype = Some(value);
        self
    }

    pub fn has_constructor(mut self, value: bool) -> Self {
        self.has_constructor = Some(value);
        self
    }

    pub fn prev_pipe(mut self, value: Option<StageId>) -> Self {
        self.prev_pipe = Some(value);
        self
    }
}

/// Stack of scopes, innermost last. The root is never popped.
#[derive(Debug, Clone)]
pub struct ScopeChain {
    scopes: Vec<Scope>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    /// Creates the root scope with every builtin bound.
    pub fn seeded(builtins: &[Builtin], symbols: &mut SymbolTable) -> Self {
        let mut chain = Self::new();
        for builtin in builtins {
            let return_type = Type::Primitive(builtin.return_type);
            let mut symbol = match builtin.kind {
                BuiltinKind::Prototype(kind) => Symbol::new(
                    builtin.name,
                    SymbolKind::Prototype,
                    Type::Primitive(kind),
                    SourceSpan::default(),
                ),
                BuiltinKind::Function | BuiltinKind::Method => {
                    let kind = if builtin.kind == BuiltinKind::Method {
                        SymbolKind::Method
                    } else {
                        SymbolKind::Function
                    };
                    let signature = match builtin.arity {
                        BuiltinArity::Variadic => Signature::variadic(),
                        BuiltinArity::Exact(_) => Signature::fixed(
                            builtin.params.iter().copied().map(Type::Primitive).collect(),
                        ),
                    };
                    Symbol::new(builtin.name, kind, return_type, SourceSpan::default())
                        .with_signature(signature)
                }
            };
            symbol.builtin = true;
            let id = symbols.push(symbol);
            chain.add(builtin.name, id);
        }
        chain
    }

    /// Binds `name` in the innermost scope, replacing any previous binding there.
    pub fn add<S: Into<String>>(&mut self, name: S, symbol: SymbolId) {
        self.current_mut().names.insert(name.into(), symbol);
    }

    pub fn lookup(&self, name: &str, span: SourceSpan) -> AnalysisResult<SymbolId> {
        self.find(name)
            .ok_or_else(|| CompileError::undeclared(name, span))
    }

    /// Non-failing probe for `name` anywhere in the chain.
    pub fn sees(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    fn find(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn push_child(&mut self, overrides: ScopeOverrides) {
        let child = self.current().child(overrides);
        self.scopes.push(child);
    }

    pub fn pop(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn current(&self) -> &Scope {
        // The root is never removed, so the stack is never empty.
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}
