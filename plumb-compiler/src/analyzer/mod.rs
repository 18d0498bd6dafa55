mod pipes;

use tracing::debug;

use crate::ast::*;
use crate::error::{AnalysisResult, CompileError};
use crate::scope::{ScopeChain, ScopeOverrides};
use crate::stdlib::{Builtin, BUILTINS};
use crate::symbols::{Signature, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::types::{
    is_assignable, is_equivalent, PrototypeTable, Type, UserType, UserTypeId,
};

/// Everything the analyzer learned about a program. The tree itself carries
/// the per-node annotations; these tables give them meaning.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub prototypes: PrototypeTable,
}

pub struct Analyzer {
    scopes: ScopeChain,
    symbols: SymbolTable,
    prototypes: PrototypeTable,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer {
    pub fn new() -> Self {
        Self::with_builtins(BUILTINS)
    }

    pub fn with_builtins(builtins: &[Builtin]) -> Self {
        let mut symbols = SymbolTable::new();
        let scopes = ScopeChain::seeded(builtins, &mut symbols);
        Self {
            scopes,
            symbols,
            prototypes: PrototypeTable::new(),
        }
    }

    /// Resolves and type-checks `program` in place. Stops at the first error.
    pub fn analyze(mut self, program: &mut Program) -> AnalysisResult<Analysis> {
        debug!(imports = program.imports.len(), "analyzing program");
        // Definitions live in a program scope so pipelines can see them.
        self.scopes.push_child(ScopeOverrides::default());

        if let Some(definitions) = &mut program.definitions {
            self.analyze_block(&mut definitions.block)?;
        }
        if let Some(pipelines) = &mut program.pipelines {
            self.analyze_pipelines(pipelines)?;
        }

        debug!(symbols = self.symbols.len(), prototypes = self.prototypes.len(), "analysis complete");
        Ok(Analysis {
            symbols: self.symbols,
            prototypes: self.prototypes,
        })
    }

    fn in_child_scope<T>(
        &mut self,
        overrides: ScopeOverrides,
        f: impl FnOnce(&mut Self) -> AnalysisResult<T>,
    ) -> AnalysisResult<T> {
        self.scopes.push_child(overrides);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn describe(&self, ty: &Type) -> String {
        self.prototypes.describe(ty)
    }

    /// Rejects any declaration whose name already resolves, in this scope or an
    /// enclosing one.
    fn check_declaration(&self, name: &Identifier) -> AnalysisResult<()> {
        if self.scopes.sees(&name.name) {
            return Err(CompileError::scope(
                format!("{} already declared in given context", name.name),
                name.span,
            ));
        }
        Ok(())
    }

    fn bind(&mut self, name: &mut Identifier, kind: SymbolKind, ty: Type) -> SymbolId {
        let id = self
            .symbols
            .push(Symbol::new(name.name.clone(), kind, ty, name.span));
        name.symbol = Some(id);
        self.scopes.add(name.name.clone(), id);
        id
    }

    fn ensure_assignable(&self, from: &Type, to: &Type, span: SourceSpan) -> AnalysisResult<()> {
        if is_assignable(from, to) {
            Ok(())
        } else {
            Err(CompileError::type_error(
                format!("Cannot assign a {} to a {}", self.describe(from), self.describe(to)),
                span,
            ))
        }
    }

    fn resolve_type(&mut self, annotation: &mut TypeAnnotation) -> AnalysisResult<Type> {
        match annotation {
            TypeAnnotation::Named(identifier) => {
                let id = self.scopes.lookup(&identifier.name, identifier.span)?;
                identifier.symbol = Some(id);
                let symbol = self.symbols.get(id);
                match (symbol.kind, symbol.constructor_of) {
                    (SymbolKind::Prototype, _) => Ok(symbol.ty.clone()),
                    // Inside a prototype body its constructor shadows the type name.
                    (SymbolKind::Function, Some(user_type)) => Ok(Type::User(user_type)),
                    _ => Err(CompileError::type_error("Type expected", identifier.span)),
                }
            }
            TypeAnnotation::List(inner, _) => Ok(Type::list_of(self.resolve_type(inner)?)),
            TypeAnnotation::Map(inner, _) => Ok(Type::map_of(self.resolve_type(inner)?)),
        }
    }

    fn analyze_block(&mut self, block: &mut Block) -> AnalysisResult<()> {
        for statement in &mut block.statements {
            self.analyze_statement(statement)?;
        }
        Ok(())
    }

    fn analyze_statement(&mut self, statement: &mut Statement) -> AnalysisResult<()> {
        match statement {
            Statement::Variable(dec) => {
                let ty = self.resolve_type(&mut dec.ty)?;
                self.analyze_declaration(&mut dec.name, ty, &mut dec.value)
            }
            Statement::List(dec) => {
                let ty = Type::list_of(self.resolve_type(&mut dec.element)?);
                self.analyze_declaration(&mut dec.name, ty, &mut dec.value)
            }
            Statement::Map(dec) => {
                let ty = Type::map_of(self.resolve_type(&mut dec.element)?);
                self.analyze_declaration(&mut dec.name, ty, &mut dec.value)
            }
            Statement::Assignment(assignment) => self.analyze_assignment(assignment),
            Statement::Function(dec) => self.analyze_function(dec),
            Statement::Prototype(dec) => self.analyze_prototype(dec),
            Statement::Attribute(dec) => self.analyze_attribute(dec),
            Statement::Method(dec) => self.analyze_method(dec),
            Statement::If(statement) => {
                self.analyze_condition(&mut statement.condition)?;
                self.in_child_scope(ScopeOverrides::default(), |this| {
                    this.analyze_block(&mut statement.body)
                })
            }
            Statement::While(statement) => {
                self.analyze_condition(&mut statement.condition)?;
                self.in_child_scope(ScopeOverrides::default().in_loop(true), |this| {
                    this.analyze_block(&mut statement.body)
                })
            }
            Statement::For(statement) => self.analyze_for(statement),
            Statement::Return(statement) => self.analyze_return(statement),
            Statement::Break(span) => self.analyze_jump("break", *span),
            Statement::Continue(span) => self.analyze_jump("continue", *span),
            Statement::Expression(statement) => {
                self.analyze_expression(&mut statement.expression, None)?;
                Ok(())
            }
        }
    }

    /// Initializer first, then the redeclaration check, then the binding.
    fn analyze_declaration(
        &mut self,
        name: &mut Identifier,
        ty: Type,
        value: &mut Expression,
    ) -> AnalysisResult<()> {
        let value_type = self.analyze_expression(value, Some(&ty))?;
        self.check_declaration(name)?;
        self.ensure_assignable(&value_type, &ty, value.span)?;
        self.bind(name, SymbolKind::Variable, ty);
        Ok(())
    }

    fn analyze_assignment(&mut self, assignment: &mut Assignment) -> AnalysisResult<()> {
        let target_type = if assignment.is_self {
            let user_type = self.current_prototype(assignment.target.span)?;
            let attribute = self.find_attribute(user_type, &assignment.target)?;
            assignment.target.symbol = Some(attribute);
            self.symbols.get(attribute).ty.clone()
        } else {
            let id = self
                .scopes
                .lookup(&assignment.target.name, assignment.target.span)?;
            assignment.target.symbol = Some(id);
            let symbol = self.symbols.get(id);
            if !matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Parameter) {
                return Err(CompileError::type_error(
                    format!(
                        "Cannot assign to {} {}",
                        symbol.kind.describe(),
                        symbol.name
                    ),
                    assignment.target.span,
                ));
            }
            symbol.ty.clone()
        };

        let value_type = self.analyze_expression(&mut assignment.value, Some(&target_type))?;
        match assignment.operator {
            AssignOperator::Assign => {
                self.ensure_assignable(&value_type, &target_type, assignment.value.span)
            }
            AssignOperator::AddAssign => {
                if !(target_type.is_numeric() || target_type.is_string()) {
                    return Err(CompileError::type_error(
                        "Expected a number or string",
                        assignment.target.span,
                    ));
                }
                self.ensure_equivalent(&target_type, &value_type, assignment.span)
            }
            _ => {
                self.ensure_numeric(&target_type, assignment.target.span)?;
                self.ensure_numeric(&value_type, assignment.value.span)?;
                self.ensure_equivalent(&target_type, &value_type, assignment.span)
            }
        }
    }

    fn analyze_function(&mut self, dec: &mut FunctionDec) -> AnalysisResult<()> {
        let scope = self.scopes.current();
        let constructor_of = match scope.prototype {
            Some(user_type) if scope.function.is_none() && !scope.has_constructor => {
                Some(user_type)
            }
            _ => None,
        };

        let return_type = match constructor_of {
            Some(user_type) => {
                self.scopes.current_mut().has_constructor = true;
                dec.is_constructor = true;
                Type::User(user_type)
            }
            None => {
                let ty = self.resolve_type(&mut dec.return_type)?;
                self.check_declaration(&dec.name)?;
                ty
            }
        };

        let parameters = self.resolve_parameter_types(&mut dec.parameters)?;
        let mut symbol = Symbol::new(
            dec.name.name.clone(),
            SymbolKind::Function,
            return_type,
            dec.name.span,
        )
        .with_signature(Signature::fixed(parameters.clone()));
        symbol.constructor_of = constructor_of;
        let id = self.symbols.push(symbol);
        dec.name.symbol = Some(id);
        if let Some(user_type) = constructor_of {
            self.prototypes.get_mut(user_type).constructor = Some(id);
        }
        self.scopes.add(dec.name.name.clone(), id);

        self.analyze_callable_body(id, &mut dec.parameters, parameters, &mut dec.body)
    }

    fn resolve_parameter_types(
        &mut self,
        parameters: &mut [TypeParameterPairDec],
    ) -> AnalysisResult<Vec<Type>> {
        parameters
            .iter_mut()
            .map(|parameter| self.resolve_type(&mut parameter.ty))
            .collect()
    }

    fn analyze_callable_body(
        &mut self,
        owner: SymbolId,
        parameters: &mut [TypeParameterPairDec],
        types: Vec<Type>,
        body: &mut Block,
    ) -> AnalysisResult<()> {
        let overrides = ScopeOverrides::default()
            .function(Some(owner))
            .in_loop(false);
        self.in_child_scope(overrides, |this| {
            for (parameter, ty) in parameters.iter_mut().zip(types) {
                this.check_declaration(&parameter.name)?;
                this.bind(&mut parameter.name, SymbolKind::Parameter, ty);
            }
            this.analyze_block(body)
        })
    }

    fn analyze_prototype(&mut self, dec: &mut PrototypeDec) -> AnalysisResult<()> {
        self.check_declaration(&dec.name)?;
        let user_type = self.prototypes.add(UserType::new(dec.name.name.clone()));
        self.bind(&mut dec.name, SymbolKind::Prototype, Type::User(user_type));

        let overrides = ScopeOverrides::default()
            .prototype(Some(user_type))
            .has_constructor(false)
            .function(None)
            .in_loop(false);
        self.in_child_scope(overrides, |this| {
            for statement in &mut dec.body.statements {
                match statement {
                    Statement::Attribute(_) | Statement::Method(_) | Statement::Function(_) => {
                        this.analyze_statement(statement)?
                    }
                    _ => {
                        return Err(CompileError::structural(
                            "Only attributes, methods, and a constructor may appear in a prototype",
                            statement_span(statement),
                        ))
                    }
                }
            }
            Ok(())
        })
    }

    /// The user type whose body directly encloses the current scope.
    fn member_owner(&self, what: &str, span: SourceSpan) -> AnalysisResult<UserTypeId> {
        let scope = self.scopes.current();
        match scope.prototype {
            Some(user_type) if scope.function.is_none() => Ok(user_type),
            _ => Err(CompileError::structural(
                format!("{what} can only appear in a prototype"),
                span,
            )),
        }
    }

    fn analyze_attribute(&mut self, dec: &mut AttributeDec) -> AnalysisResult<()> {
        let user_type = self.member_owner("Attributes", dec.name.span)?;
        let ty = self.resolve_type(&mut dec.ty)?;
        if let Some(value) = &mut dec.value {
            let value_type = self.analyze_expression(value, Some(&ty))?;
            self.ensure_assignable(&value_type, &ty, value.span)?;
        }
        let id = self.symbols.push(Symbol::new(
            dec.name.name.clone(),
            SymbolKind::Attribute,
            ty,
            dec.name.span,
        ));
        dec.name.symbol = Some(id);
        self.prototypes.get_mut(user_type).attributes.push(id);
        Ok(())
    }

    fn analyze_method(&mut self, dec: &mut MethodDec) -> AnalysisResult<()> {
        let user_type = self.member_owner("Methods", dec.name.span)?;
        let return_type = self.resolve_type(&mut dec.return_type)?;
        let parameters = self.resolve_parameter_types(&mut dec.parameters)?;
        let id = self.symbols.push(
            Symbol::new(
                dec.name.name.clone(),
                SymbolKind::Method,
                return_type,
                dec.name.span,
            )
            .with_signature(Signature::fixed(parameters.clone())),
        );
        dec.name.symbol = Some(id);
        // Registered before the body so the method can call itself through `self`.
        self.prototypes.get_mut(user_type).methods.push(id);
        self.analyze_callable_body(id, &mut dec.parameters, parameters, &mut dec.body)
    }

    fn analyze_condition(&mut self, condition: &mut Expression) -> AnalysisResult<()> {
        let ty = self.analyze_expression(condition, Some(&Type::BOOL))?;
        if !ty.is_boolean() {
            return Err(CompileError::type_error("Expected a boolean", condition.span));
        }
        Ok(())
    }

    fn analyze_for(&mut self, statement: &mut ForStatement) -> AnalysisResult<()> {
        self.in_child_scope(ScopeOverrides::default().in_loop(true), |this| {
            this.analyze_statement(&mut statement.initializer)?;
            this.analyze_condition(&mut statement.condition)?;
            match statement.step.as_mut() {
                Statement::Assignment(step) if step.operator != AssignOperator::Assign => {
                    this.analyze_assignment(step)?
                }
                other => {
                    return Err(CompileError::structural(
                        "Not an incrementing assignment statement",
                        statement_span(other),
                    ))
                }
            }
            this.analyze_block(&mut statement.body)
        })
    }

    fn analyze_return(&mut self, statement: &mut ReturnStatement) -> AnalysisResult<()> {
        let function = self.scopes.current().function.ok_or_else(|| {
            CompileError::structural("Return can only appear in a function", statement.span)
        })?;
        let expected = self.symbols.get(function).ty.clone();
        let ty = match &mut statement.value {
            Some(value) => self.analyze_expression(value, Some(&expected))?,
            None => Type::DNE,
        };
        self.ensure_assignable(&ty, &expected, statement.span)
    }

    fn analyze_jump(&self, keyword: &str, span: SourceSpan) -> AnalysisResult<()> {
        if self.scopes.current().in_loop {
            Ok(())
        } else {
            Err(CompileError::structural(
                format!("{keyword} can only appear in a loop"),
                span,
            ))
        }
    }

    /// The user type `self` refers to. Plain functions declared in a prototype
    /// have no receiver.
    fn current_prototype(&self, span: SourceSpan) -> AnalysisResult<UserTypeId> {
        let scope = self.scopes.current();
        let user_type = scope
            .prototype
            .ok_or_else(|| CompileError::scope("self can only appear inside a prototype", span))?;
        if let Some(function) = scope.function {
            let owner = self.symbols.get(function);
            if owner.kind == SymbolKind::Function && owner.constructor_of.is_none() {
                return Err(CompileError::scope(
                    "self can only appear in a method or constructor",
                    span,
                ));
            }
        }
        Ok(user_type)
    }

    /// First attribute of `user_type` named like `name`.
    fn find_attribute(&self, user_type: UserTypeId, name: &Identifier) -> AnalysisResult<SymbolId> {
        self.prototypes
            .get(user_type)
            .attributes
            .iter()
            .copied()
            .find(|id| self.symbols.get(*id).name == name.name)
            .ok_or_else(|| CompileError::undeclared(&name.name, name.span))
    }

    fn find_method(&self, user_type: UserTypeId, name: &str) -> Option<SymbolId> {
        self.prototypes
            .get(user_type)
            .methods
            .iter()
            .copied()
            .find(|id| self.symbols.get(*id).name == name)
    }

    fn ensure_numeric(&self, ty: &Type, span: SourceSpan) -> AnalysisResult<()> {
        if ty.is_numeric() {
            Ok(())
        } else {
            Err(CompileError::type_error("Expected a number", span))
        }
    }

    fn ensure_boolean(&self, ty: &Type, span: SourceSpan) -> AnalysisResult<()> {
        if ty.is_boolean() {
            Ok(())
        } else {
            Err(CompileError::type_error("Expected a boolean", span))
        }
    }

    fn ensure_equivalent(&self, left: &Type, right: &Type, span: SourceSpan) -> AnalysisResult<()> {
        if is_equivalent(left, right) {
            Ok(())
        } else {
            Err(CompileError::type_error("Operands not of equivalent type", span))
        }
    }

    /// Types `expression`, records the result on the node and returns it.
    /// `expected` only steers container literals.
    fn analyze_expression(
        &mut self,
        expression: &mut Expression,
        expected: Option<&Type>,
    ) -> AnalysisResult<Type> {
        if let Some(ty) = &expression.ty {
            return Ok(ty.clone());
        }
        let span = expression.span;
        let ty = match &mut expression.kind {
            ExpressionKind::Literal(literal) => match literal {
                Literal::Integer(_) => Type::INT,
                Literal::Rational(_) => Type::RAT,
                Literal::String(_) => Type::STR,
                Literal::Boolean(_) => Type::BOOL,
                Literal::Null | Literal::Undefined => Type::DNE,
            },
            ExpressionKind::Identifier(identifier) => {
                let id = self.scopes.lookup(&identifier.name, identifier.span)?;
                identifier.symbol = Some(id);
                self.symbols.get(id).ty.clone()
            }
            ExpressionKind::SelfRef => Type::User(self.current_prototype(span)?),
            ExpressionKind::Binary(binary) => self.analyze_binary(binary, span)?,
            ExpressionKind::Unary(unary) => {
                let operand = self.analyze_expression(&mut unary.operand, None)?;
                match unary.operator {
                    UnaryOperator::Not => {
                        self.ensure_boolean(&operand, unary.operand.span)?;
                        Type::BOOL
                    }
                    UnaryOperator::Negate => {
                        self.ensure_numeric(&operand, unary.operand.span)?;
                        operand
                    }
                }
            }
            ExpressionKind::Index(index) => self.analyze_index(index)?,
            ExpressionKind::Access(access) => {
                let object = self.analyze_expression(&mut access.object, None)?;
                match object {
                    Type::User(user_type) => {
                        let attribute = self.find_attribute(user_type, &access.attribute)?;
                        access.attribute.symbol = Some(attribute);
                        self.symbols.get(attribute).ty.clone()
                    }
                    ty if ty.is_dne() => Type::DNE,
                    other => {
                        return Err(CompileError::type_error(
                            format!(
                                "{} has no attribute {}",
                                self.describe(&other),
                                access.attribute.name
                            ),
                            access.attribute.span,
                        ))
                    }
                }
            }
            ExpressionKind::Method(method) => self.analyze_method_call(method, span)?,
            ExpressionKind::Call(call) => self.analyze_call(call, span)?,
            ExpressionKind::List(list) => self.analyze_list(list, expected)?,
            ExpressionKind::Map(map) => self.analyze_map(map, expected)?,
            ExpressionKind::Cast(cast) => {
                self.analyze_expression(&mut cast.value, None)?;
                cast.target.clone()
            }
        };
        expression.ty = Some(ty.clone());
        Ok(ty)
    }

    fn analyze_binary(
        &mut self,
        binary: &mut BinaryExpression,
        span: SourceSpan,
    ) -> AnalysisResult<Type> {
        let left = self.analyze_expression(&mut binary.left, None)?;
        let right = self.analyze_expression(&mut binary.right, None)?;
        match binary.operator {
            BinaryOperator::And | BinaryOperator::Or => {
                self.ensure_boolean(&left, binary.left.span)?;
                self.ensure_boolean(&right, binary.right.span)?;
                Ok(Type::BOOL)
            }
            BinaryOperator::Equal | BinaryOperator::NotEqual => {
                self.ensure_equivalent(&left, &right, span)?;
                Ok(Type::BOOL)
            }
            operator => {
                self.ensure_numeric(&left, binary.left.span)?;
                self.ensure_numeric(&right, binary.right.span)?;
                self.ensure_equivalent(&left, &right, span)?;
                if operator.is_comparison() {
                    Ok(Type::BOOL)
                } else {
                    Ok(left)
                }
            }
        }
    }

    fn analyze_index(&mut self, index: &mut IndexExpression) -> AnalysisResult<Type> {
        let object = self.analyze_expression(&mut index.object, None)?;
        let key = self.analyze_expression(&mut index.index, None)?;
        match object {
            Type::ListOf(base) => {
                if !is_assignable(&key, &Type::INT) {
                    return Err(CompileError::type_error(
                        "List index must be an integer",
                        index.index.span,
                    ));
                }
                Ok(*base)
            }
            Type::MapOf(base) => {
                if !is_assignable(&key, &Type::STR) {
                    return Err(CompileError::type_error(
                        "Map key must be a string",
                        index.index.span,
                    ));
                }
                Ok(*base)
            }
            ty if ty.is_dne() => Ok(Type::DNE),
            _ => Err(CompileError::type_error(
                "Expected a list or map",
                index.object.span,
            )),
        }
    }

    fn analyze_method_call(
        &mut self,
        method: &mut MethodExpression,
        span: SourceSpan,
    ) -> AnalysisResult<Type> {
        let receiver = self.analyze_expression(&mut method.object, None)?;
        let own_method = receiver
            .user_id()
            .and_then(|user_type| self.find_method(user_type, &method.method.name));
        let id = match own_method {
            Some(id) => id,
            None => {
                let id = self.scopes.lookup(&method.method.name, method.method.span)?;
                if self.symbols.get(id).kind != SymbolKind::Method {
                    return Err(CompileError::type_error(
                        format!("{} is not a method", method.method.name),
                        method.method.span,
                    ));
                }
                if !matches!(receiver, Type::ListOf(_)) && !receiver.is_dne() {
                    return Err(CompileError::type_error(
                        format!(
                            "{} has no method {}",
                            self.describe(&receiver),
                            method.method.name
                        ),
                        method.method.span,
                    ));
                }
                id
            }
        };
        method.method.symbol = Some(id);
        let symbol = self.symbols.get(id).clone();
        let signature = symbol.signature.clone().unwrap_or_else(Signature::variadic);

        // Builtin list methods take the element type of their receiver.
        let signature = match (&receiver, symbol.builtin) {
            (Type::ListOf(base), true) if !signature.variadic => Signature::fixed(
                signature.parameters.iter().map(|_| (**base).clone()).collect(),
            ),
            _ => signature,
        };
        self.check_arguments(&signature, &mut method.arguments, span)?;
        Ok(symbol.ty)
    }

    fn analyze_call(&mut self, call: &mut CallExpression, span: SourceSpan) -> AnalysisResult<Type> {
        let id = self.scopes.lookup(&call.callee.name, call.callee.span)?;
        call.callee.symbol = Some(id);
        let symbol = self.symbols.get(id).clone();
        match (symbol.kind, &symbol.ty) {
            (SymbolKind::Function, _) => {
                let signature = symbol.signature.clone().unwrap_or_else(Signature::variadic);
                self.check_arguments(&signature, &mut call.arguments, span)?;
                Ok(symbol.ty.clone())
            }
            (SymbolKind::Prototype, Type::User(user_type)) => {
                let signature = match self.prototypes.get(*user_type).constructor {
                    Some(constructor) => self
                        .symbols
                        .get(constructor)
                        .signature
                        .clone()
                        .unwrap_or_else(|| Signature::fixed(Vec::new())),
                    None => Signature::fixed(Vec::new()),
                };
                self.check_arguments(&signature, &mut call.arguments, span)?;
                Ok(symbol.ty.clone())
            }
            _ => Err(CompileError::type_error(
                "Call of a non-function or non-constructor",
                call.callee.span,
            )),
        }
    }

    fn check_arguments(
        &mut self,
        signature: &Signature,
        arguments: &mut [Expression],
        span: SourceSpan,
    ) -> AnalysisResult<()> {
        let mut types = Vec::with_capacity(arguments.len());
        for argument in arguments.iter_mut() {
            types.push(self.analyze_expression(argument, None)?);
        }
        if signature.variadic {
            return Ok(());
        }
        if signature.parameters.len() != arguments.len() {
            return Err(CompileError::type_error(
                format!(
                    "Expected {} arguments but got {}",
                    signature.parameters.len(),
                    arguments.len()
                ),
                span,
            ));
        }
        for ((argument, ty), parameter) in arguments.iter().zip(&types).zip(&signature.parameters) {
            self.ensure_assignable(ty, parameter, argument.span)?;
        }
        Ok(())
    }

    fn analyze_list(&mut self, list: &mut ListExp, expected: Option<&Type>) -> AnalysisResult<Type> {
        let hint = match expected {
            Some(Type::ListOf(base)) => Some((**base).clone()),
            _ => None,
        };
        let base = self.analyze_elements(
            list.elements.iter_mut().collect(),
            hint,
            "Elements in list not all of same type",
        )?;
        Ok(Type::list_of(base))
    }

    fn analyze_map(&mut self, map: &mut MapExp, expected: Option<&Type>) -> AnalysisResult<Type> {
        for entry in &mut map.entries {
            let key = self.analyze_expression(&mut entry.key, None)?;
            if !key.is_string() {
                return Err(CompileError::type_error(
                    "Map keys must be strings",
                    entry.key.span,
                ));
            }
        }
        let hint = match expected {
            Some(Type::MapOf(base)) => Some((**base).clone()),
            _ => None,
        };
        let base = self.analyze_elements(
            map.entries.iter_mut().map(|entry| &mut entry.value).collect(),
            hint,
            "Values in map not all of same type",
        )?;
        Ok(Type::map_of(base))
    }

    /// Infers the shared element type of a container literal. A DNE hint
    /// tolerates mixed elements.
    fn analyze_elements(
        &mut self,
        elements: Vec<&mut Expression>,
        hint: Option<Type>,
        mismatch: &str,
    ) -> AnalysisResult<Type> {
        let heterogeneous = hint.as_ref().is_some_and(Type::is_dne);
        let mut base: Option<Type> = None;
        for element in elements {
            let ty = self.analyze_expression(element, hint.as_ref())?;
            match &base {
                None => base = Some(ty),
                Some(first) if heterogeneous || is_equivalent(first, &ty) => {}
                Some(_) => return Err(CompileError::type_error(mismatch, element.span)),
            }
        }
        Ok(match (heterogeneous, base, hint) {
            (true, _, _) => Type::DNE,
            (false, Some(base), _) => base,
            (false, None, Some(hint)) => hint,
            (false, None, None) => Type::DNE,
        })
    }
}

/// Best available location for a statement in error messages.
fn statement_span(statement: &Statement) -> SourceSpan {
    match statement {
        Statement::Variable(dec) => SourceSpan::union(&dec.name.span, &dec.value.span),
        Statement::List(dec) => SourceSpan::union(&dec.name.span, &dec.value.span),
        Statement::Map(dec) => SourceSpan::union(&dec.name.span, &dec.value.span),
        Statement::Assignment(assignment) => assignment.span,
        Statement::Function(dec) => dec.name.span,
        Statement::Prototype(dec) => dec.name.span,
        Statement::Attribute(dec) => dec.name.span,
        Statement::Method(dec) => dec.name.span,
        Statement::If(statement) => statement.condition.span,
        Statement::While(statement) => statement.condition.span,
        Statement::For(statement) => statement.span,
        Statement::Return(statement) => statement.span,
        Statement::Break(span) | Statement::Continue(span) => *span,
        Statement::Expression(statement) => statement.expression.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::SourceFile;

    fn analyze(source: &str) -> (Program, AnalysisResult<Analysis>) {
        let file = SourceFile::inline(source);
        let tokens = Lexer::new(&file).unwrap().tokenize().unwrap();
        let mut program = Parser::new(&file, tokens).parse().unwrap();
        let result = Analyzer::new().analyze(&mut program);
        (program, result)
    }

    fn error(source: &str) -> CompileError {
        analyze(source).1.expect_err("analysis should fail")
    }

    #[test]
    fn constructor_binds_to_first_function_in_prototype() {
        let (program, result) = analyze(
            "Definitions{\nPROTO BOX{\nATR INT volume\nBOX FUNC BOX(INT volume){\nself.volume <== volume\n}\nINT FUNC helper(){\nreturn 1\n}\n}\n}",
        );
        let analysis = result.unwrap();
        let user_type = analysis.prototypes.get(UserTypeId(0));
        let constructor = user_type.constructor.expect("constructor bound");
        assert_eq!(analysis.symbols.get(constructor).ty, Type::User(UserTypeId(0)));
        assert_eq!(user_type.attributes.len(), 1);

        let Statement::Prototype(prototype) = &program.definitions.unwrap().block.statements[0] else {
            panic!("expected prototype");
        };
        let Statement::Function(helper) = &prototype.body.statements[2] else {
            panic!("expected helper function");
        };
        assert!(!helper.is_constructor);
    }

    #[test]
    fn list_index_yields_the_base_type() {
        let (program, result) =
            analyze("Definitions{\n||INT|| k <== ||1, 2, 3||\nINT first <== k[0]\n}");
        result.unwrap();
        let Statement::Variable(dec) = &program.definitions.unwrap().block.statements[1] else {
            panic!("expected variable");
        };
        assert_eq!(dec.value.ty, Some(Type::INT));
    }

    #[test]
    fn dne_element_type_tolerates_mixed_lists() {
        let (_, result) = analyze("Definitions{\n||DNE|| mixed <== ||1, \"two\", true||\n}");
        assert!(result.is_ok());
        let err = error("Definitions{\n||INT|| mixed <== ||1, \"two\"||\n}");
        assert_eq!(err.message, "Elements in list not all of same type");
    }

    #[test]
    fn break_outside_loop_is_structural() {
        let err = error("Definitions{\nbreak\n}");
        assert_eq!(err.category, ErrorCategory::Structural);
    }

    #[test]
    fn loop_flag_resets_inside_functions() {
        let err = error(
            "Definitions{\nwhile(true){\nDNE FUNC f(){\nbreak\n}\n}\n}",
        );
        assert_eq!(err.message, "break can only appear in a loop");
    }

    #[test]
    fn user_types_cannot_be_assigned_to_primitives() {
        let err = error(
            "Definitions{\nPROTO BOX{\nATR INT volume\n}\nINT n <== BOX()\n}",
        );
        assert_eq!(err.message, "Cannot assign a BOX to a INT");
    }
}
