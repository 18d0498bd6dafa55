use tracing::{debug, trace};

use super::Analyzer;
use crate::ast::*;
use crate::error::{AnalysisResult, CompileError};
use crate::scope::ScopeOverrides;
use crate::symbols::{Symbol, SymbolId, SymbolKind};
use crate::types::{is_castable, Type};

impl Analyzer {
    /// Threads every pipe declaration into `pipelines.plan`. Declarations are
    /// resolved strictly in order since each stage reads the one before it.
    pub(super) fn analyze_pipelines(&mut self, pipelines: &mut Pipelines) -> AnalysisResult<()> {
        let mut plan = PipePlan::default();
        self.in_child_scope(ScopeOverrides::default().prev_pipe(None), |this| {
            for dec in &mut pipelines.pipes {
                let heads = this.resolve_stage(dec, &mut plan)?;
                plan.chains.extend(heads);
            }
            Ok(())
        })?;
        debug!(
            stages = plan.stages.len(),
            chains = plan.chains.len(),
            "resolved pipelines"
        );
        pipelines.plan = plan;
        Ok(())
    }

    /// Resolves `dec` and everything downstream of it, returning the ids of
    /// the stages created for `dec` itself (several when a literal fans out).
    /// Each stage links itself to the stage it is chained from.
    fn resolve_stage(
        &mut self,
        dec: &mut PipeDec,
        plan: &mut PipePlan,
    ) -> AnalysisResult<Vec<StageId>> {
        let operator = classify_operator(&dec.operator, dec.operator_span)?;
        for input in &mut dec.inputs {
            self.analyze_expression(input, None)?;
        }

        let chained_from = self
            .scopes
            .current()
            .prev_pipe
            .filter(|id| plan.stage(*id).feeds_pipe);
        let values = match chained_from {
            Some(prev) => {
                let arguments = plan.stage(prev).outputs.values();
                dec.inputs
                    .iter()
                    .map(|input| self.wrap_call(input, arguments.clone()))
                    .collect::<AnalysisResult<Vec<_>>>()?
            }
            None => dec.inputs.clone(),
        };

        let outputs = match &operator {
            PipeOperator::Inject => vec![PipeOutput::Values(values)],
            PipeOperator::Drain(names) => vec![self.drain(names, values)?],
            PipeOperator::Cast(name) => vec![self.cast(name, dec.operator_span, values)?],
            PipeOperator::FanOut => self.fan_out(values, chained_from.is_some(), dec.operator_span)?,
            PipeOperator::Sink => {
                return Err(CompileError::structural(
                    format!("Unrecognized pipe operator {}", dec.operator),
                    dec.operator_span,
                ))
            }
        };
        // An exploded literal becomes plain injections, one per element.
        let operator = if outputs.len() > 1 {
            PipeOperator::Inject
        } else {
            operator
        };

        let mut heads = Vec::with_capacity(outputs.len());
        for output in outputs {
            let id = plan.push(PipeObj {
                inputs: dec.inputs.clone(),
                operator: operator.clone(),
                outputs: output,
                prev: chained_from,
                next: None,
                feeds_pipe: true,
            });
            if let Some(prev) = chained_from {
                plan.stage_mut(prev).next = Some(id);
            }
            trace!(stage = id.0, operator = %dec.operator, "resolved pipe stage");
            self.scopes.current_mut().prev_pipe = Some(id);

            match &mut dec.next {
                PipeTarget::Pipe(next) => {
                    self.resolve_stage(next, plan)?;
                }
                PipeTarget::Sink(sink) => self.resolve_sink(sink, id, plan)?,
            }
            heads.push(id);
        }
        Ok(heads)
    }

    fn resolve_sink(
        &mut self,
        sink: &mut Expression,
        prev: StageId,
        plan: &mut PipePlan,
    ) -> AnalysisResult<()> {
        self.analyze_expression(sink, None)?;
        let arguments = plan.stage(prev).outputs.values();
        let call = self.wrap_call(sink, arguments)?;
        let id = plan.push(PipeObj {
            inputs: vec![sink.clone()],
            operator: PipeOperator::Sink,
            outputs: PipeOutput::Values(vec![call]),
            prev: Some(prev),
            next: None,
            feeds_pipe: false,
        });
        plan.stage_mut(prev).next = Some(id);
        trace!(stage = id.0, "resolved pipe sink");
        self.scopes.current_mut().prev_pipe = Some(id);
        Ok(())
    }

    /// Turns a stage input into a call fed by the previous stage's outputs.
    fn wrap_call(
        &mut self,
        callee: &Expression,
        arguments: Vec<Expression>,
    ) -> AnalysisResult<Expression> {
        let identifier = match &callee.kind {
            ExpressionKind::Identifier(identifier) => identifier.clone(),
            _ => {
                return Err(CompileError::type_error(
                    "Call of a non-function or non-constructor",
                    callee.span,
                ))
            }
        };
        let mut call = Expression::new(
            callee.span,
            ExpressionKind::Call(CallExpression {
                callee: identifier,
                arguments,
            }),
        );
        self.analyze_expression(&mut call, None)?;
        Ok(call)
    }

    /// `-a-b->`: projects the named attributes out of every value.
    fn drain(&self, names: &[String], values: Vec<Expression>) -> AnalysisResult<PipeOutput> {
        let mut attributes = Vec::new();
        let mut projected = Vec::new();
        for value in values {
            let user_type = match &value.ty {
                Some(Type::User(user_type)) => *user_type,
                other => {
                    let found = other
                        .as_ref()
                        .map(|ty| self.describe(ty))
                        .unwrap_or_else(|| "DNE".to_string());
                    return Err(CompileError::type_error(
                        format!("Cannot drain attributes from a {found}"),
                        value.span,
                    ));
                }
            };
            for name in names {
                let identifier = Identifier::new(name.clone(), value.span);
                let attribute = self.find_attribute(user_type, &identifier)?;
                attributes.push(attribute);
                projected.push(Expression::typed(
                    value.span,
                    ExpressionKind::Access(AccessExpression {
                        object: Box::new(value.clone()),
                        attribute: Identifier {
                            symbol: Some(attribute),
                            ..identifier
                        },
                    }),
                    self.symbols.get(attribute).ty.clone(),
                ));
            }
        }
        Ok(PipeOutput::Drain {
            attributes,
            values: projected,
        })
    }

    /// `-(T)->`: converts every value to `T`.
    fn cast(
        &self,
        name: &str,
        span: SourceSpan,
        values: Vec<Expression>,
    ) -> AnalysisResult<PipeOutput> {
        let id = self.scopes.lookup(name, span)?;
        let symbol = self.symbols.get(id);
        if symbol.kind != SymbolKind::Prototype {
            return Err(CompileError::type_error("Type expected", span));
        }
        let target = symbol.ty.clone();

        let mut converted = Vec::with_capacity(values.len());
        for value in values {
            let from = value.ty.clone().unwrap_or(Type::DNE);
            if !is_castable(&from, &target) {
                return Err(CompileError::type_error(
                    format!(
                        "Cannot cast {} to {}",
                        self.describe(&from),
                        self.describe(&target)
                    ),
                    value.span,
                ));
            }
            converted.push(Expression::typed(
                value.span,
                ExpressionKind::Cast(CastExpression {
                    value: Box::new(value),
                    target: target.clone(),
                }),
                target.clone(),
            ));
        }
        Ok(PipeOutput::Values(converted))
    }

    /// `--<(`: a list literal at the head of a line explodes into one branch
    /// per element; any other list value is spread at run time.
    fn fan_out(
        &mut self,
        mut values: Vec<Expression>,
        chained: bool,
        span: SourceSpan,
    ) -> AnalysisResult<Vec<PipeOutput>> {
        if values.len() != 1 {
            return Err(CompileError::structural(
                "Fan-out expects a single list input",
                span,
            ));
        }
        let source = values.remove(0);

        if !chained {
            if let ExpressionKind::List(list) = &source.kind {
                if list.elements.is_empty() {
                    return Err(CompileError::structural(
                        "Fan-out expects a non-empty list",
                        source.span,
                    ));
                }
                return Ok(list
                    .elements
                    .iter()
                    .cloned()
                    .map(|element| PipeOutput::Values(vec![element]))
                    .collect());
            }
        }

        let element = match &source.ty {
            Some(Type::ListOf(base)) => (**base).clone(),
            Some(ty) if ty.is_dne() => Type::DNE,
            Some(other) => {
                return Err(CompileError::type_error(
                    format!("Cannot fan out a {}", self.describe(other)),
                    source.span,
                ))
            }
            None => Type::DNE,
        };
        let item = self.spread_item(element.clone(), source.span);
        Ok(vec![PipeOutput::Spread {
            source,
            item: Expression::typed(
                span,
                ExpressionKind::Identifier(Identifier {
                    name: "item".to_string(),
                    span,
                    symbol: Some(item),
                }),
                element,
            ),
        }])
    }

    /// The loop variable a spread stage binds for its downstream stages. It is
    /// reachable only through the plan, never by name.
    fn spread_item(&mut self, ty: Type, span: SourceSpan) -> SymbolId {
        self.symbols
            .push(Symbol::new("item", SymbolKind::Variable, ty, span))
    }
}

/// Maps an operator's spelling onto the operation it performs.
fn classify_operator(spelling: &str, span: SourceSpan) -> AnalysisResult<PipeOperator> {
    let unrecognized =
        || CompileError::structural(format!("Unrecognized pipe operator {spelling}"), span);

    match spelling {
        "-->" => return Ok(PipeOperator::Inject),
        "--<(" => return Ok(PipeOperator::FanOut),
        _ => {}
    }

    let inner = spelling
        .strip_prefix('-')
        .and_then(|rest| rest.strip_suffix("->"))
        .ok_or_else(unrecognized)?;

    if let Some(name) = inner
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
    {
        if is_name(name) {
            return Ok(PipeOperator::Cast(name.to_string()));
        }
        return Err(unrecognized());
    }

    let names: Vec<&str> = inner.split('-').collect();
    if names.iter().all(|name| is_name(name)) {
        return Ok(PipeOperator::Drain(
            names.into_iter().map(str::to_string).collect(),
        ));
    }
    Err(unrecognized())
}

fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
