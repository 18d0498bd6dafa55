use std::fmt::Write as _;

use anyhow::{bail, Result};
use tracing::debug;

use crate::analyzer::{Analysis, Analyzer};
use crate::ast::{PipeOutput, Program, SourceSpan};
use crate::diagnostics::Diagnostics;
use crate::generator::{self, JsGenerator};
use crate::lexer::{Lexer, LexerError, Token};
use crate::optimizer::{Optimizer, OptimizerOptions};
use crate::parser::Parser;
use crate::source::SourceFile;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub dump_tokens: bool,
    pub optimize: bool,
    /// Re-run the optimizer until nothing changes.
    pub fixed_point: bool,
    pub max_optimizer_rounds: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dump_tokens: false,
            optimize: true,
            fixed_point: true,
            max_optimizer_rounds: 16,
        }
    }
}

pub struct Compilation {
    pub tokens: Vec<Token>,
    pub program: Program,
    pub analysis: Analysis,
    /// Zero when optimization is disabled.
    pub optimizer_rounds: usize,
}

impl Compilation {
    pub fn emit_javascript(&self) -> String {
        generator::generate(&self.program, &self.analysis)
    }

    /// Human-readable listing of the resolved pipe chains.
    pub fn describe_pipelines(&self) -> String {
        let mut output = String::new();
        let Some(pipelines) = &self.program.pipelines else {
            return output;
        };
        let plan = &pipelines.plan;
        let mut js = JsGenerator::new(&self.analysis);
        for (index, head) in plan.chains.iter().enumerate() {
            let _ = writeln!(output, "chain {index}:");
            for stage in plan.chain(*head) {
                let rendered = match &stage.outputs {
                    PipeOutput::Spread { source, item } => format!(
                        "each {} in {}",
                        js.expression(item),
                        js.expression(source)
                    ),
                    outputs => outputs
                        .values()
                        .iter()
                        .map(|value| js.expression(value))
                        .collect::<Vec<_>>()
                        .join(", "),
                };
                let _ = writeln!(output, "  {} {}", stage.operator, rendered);
            }
        }
        output
    }
}

pub struct Compiler {
    diagnostics: Diagnostics,
    options: CompileOptions,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            options,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    #[tracing::instrument(skip_all, fields(path = %source.path.display()))]
    pub fn compile(&mut self, source: &SourceFile) -> Result<Compilation> {
        let mut lexer = Lexer::new(source)?;
        let tokens = match lexer.tokenize() {
            Ok(tokens) => tokens,
            Err(err) => {
                if let Some(lexer_error) = err.downcast_ref::<LexerError>() {
                    let line = lexer_error.line();
                    let column = lexer_error.column();
                    self.diagnostics.push_error_with_span(
                        lexer_error.message().to_string(),
                        Some(SourceSpan::new(line, column, line, column)),
                    );
                } else {
                    self.diagnostics.push_error_with_span(err.to_string(), None);
                }
                bail!("Lexing failed");
            }
        };
        debug!(tokens = tokens.len(), "lexed source");

        if self.options.dump_tokens {
            for token in &tokens {
                println!("{token:?}");
            }
        }

        let mut parser = Parser::new(source, tokens.clone());
        let parsed = parser.parse();
        self.diagnostics.extend(parser.into_diagnostics());
        let mut program = match parsed {
            Ok(program) => program,
            Err(err) => {
                debug!(error = %err, "parse failed");
                bail!("Parsing failed");
            }
        };
        debug!(
            statements = program
                .definitions
                .as_ref()
                .map_or(0, |definitions| definitions.block.statements.len()),
            pipes = program
                .pipelines
                .as_ref()
                .map_or(0, |pipelines| pipelines.pipes.len()),
            "parsed program"
        );

        let analysis = match Analyzer::new().analyze(&mut program) {
            Ok(analysis) => analysis,
            Err(error) => {
                self.diagnostics.push_compile_error(&error);
                bail!("Analysis failed");
            }
        };

        let optimizer_rounds = if self.options.optimize {
            let mut optimizer = Optimizer::new(OptimizerOptions {
                fixed_point: self.options.fixed_point,
                max_rounds: self.options.max_optimizer_rounds,
            });
            optimizer.optimize(&mut program)
        } else {
            0
        };
        debug!(rounds = optimizer_rounds, "optimized program");

        Ok(Compilation {
            tokens,
            program,
            analysis,
            optimizer_rounds,
        })
    }
}
