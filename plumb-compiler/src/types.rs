use crate::symbols::SymbolId;

/// The five built-in prototypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Integer,
    Rational,
    String,
    DoesNotExist,
}

impl PrimitiveKind {
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "BOOL",
            PrimitiveKind::Integer => "INT",
            PrimitiveKind::Rational => "RAT",
            PrimitiveKind::String => "STR",
            PrimitiveKind::DoesNotExist => "DNE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserTypeId(pub u32);

/// A resolved prototype. User types compare nominally through their id,
/// list-of and map-of compare through their base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(PrimitiveKind),
    User(UserTypeId),
    ListOf(Box<Type>),
    MapOf(Box<Type>),
}

impl Type {
    pub const BOOL: Type = Type::Primitive(PrimitiveKind::Boolean);
    pub const INT: Type = Type::Primitive(PrimitiveKind::Integer);
    pub const RAT: Type = Type::Primitive(PrimitiveKind::Rational);
    pub const STR: Type = Type::Primitive(PrimitiveKind::String);
    pub const DNE: Type = Type::Primitive(PrimitiveKind::DoesNotExist);

    pub fn list_of(base: Type) -> Self {
        Type::ListOf(Box::new(base))
    }

    pub fn map_of(base: Type) -> Self {
        Type::MapOf(Box::new(base))
    }

    pub fn is_dne(&self) -> bool {
        matches!(self, Type::Primitive(PrimitiveKind::DoesNotExist))
    }

    /// Numeric check used by the operator table. DNE passes as a wildcard.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Primitive(
                PrimitiveKind::Integer | PrimitiveKind::Rational | PrimitiveKind::DoesNotExist
            )
        )
    }

    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Type::Primitive(PrimitiveKind::Boolean | PrimitiveKind::DoesNotExist)
        )
    }

    pub fn is_string(&self) -> bool {
        matches!(
            self,
            Type::Primitive(PrimitiveKind::String | PrimitiveKind::DoesNotExist)
        )
    }

    pub fn user_id(&self) -> Option<UserTypeId> {
        match self {
            Type::User(id) => Some(*id),
            _ => None,
        }
    }
}

/// Can a value of type `from` be stored where `to` is expected?
pub fn is_assignable(from: &Type, to: &Type) -> bool {
    if from.is_dne() || to.is_dne() {
        return true;
    }
    match (from, to) {
        (Type::ListOf(from_base), Type::ListOf(to_base))
        | (Type::MapOf(from_base), Type::MapOf(to_base)) => is_assignable(from_base, to_base),
        _ => from == to,
    }
}

/// Operand equivalence for binary operators; the same wildcard rule, symmetric.
pub fn is_equivalent(left: &Type, right: &Type) -> bool {
    is_assignable(left, right) && is_assignable(right, left)
}

/// Whether a cast pipe may convert `from` into `to`.
pub fn is_castable(from: &Type, to: &Type) -> bool {
    if is_assignable(from, to) {
        return true;
    }
    match (from, to) {
        (Type::Primitive(from), Type::Primitive(to)) => matches!(
            (from, to),
            (PrimitiveKind::Integer, PrimitiveKind::Rational)
                | (PrimitiveKind::Rational, PrimitiveKind::Integer)
                | (_, PrimitiveKind::String)
        ),
        _ => false,
    }
}

/// A user-declared prototype: `PROTO NAME { ... }`.
#[derive(Debug, Clone)]
pub struct UserType {
    pub name: String,
    /// Declaration order matters: lookups take the first match.
    pub attributes: Vec<SymbolId>,
    pub methods: Vec<SymbolId>,
    pub constructor: Option<SymbolId>,
}

impl UserType {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            methods: Vec::new(),
            constructor: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PrototypeTable {
    types: Vec<UserType>,
}

impl PrototypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, user_type: UserType) -> UserTypeId {
        let id = UserTypeId(self.types.len() as u32);
        self.types.push(user_type);
        id
    }

    pub fn get(&self, id: UserTypeId) -> &UserType {
        &self.types[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: UserTypeId) -> &mut UserType {
        &mut self.types[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Renders a type the way it is spelled in source.
    pub fn describe(&self, ty: &Type) -> String {
        match ty {
            Type::Primitive(kind) => kind.name().to_string(),
            Type::User(id) => self.get(*id).name.clone(),
            Type::ListOf(base) => format!("||{}||", self.describe(base)),
            Type::MapOf(base) => format!("<<{}>>", self.describe(base)),
        }
    }
}
