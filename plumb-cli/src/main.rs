use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use plumb_compiler::{
    Compilation, CompileOptions, Compiler, Diagnostic, DiagnosticLevel, SourceFile, SourceId,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// JavaScript for the whole program.
    Js,
    /// The analyzed (and optimized) program tree.
    Ast,
    /// The resolved pipe chains, one stage per line.
    Pipes,
    /// The lexer's token stream.
    Tokens,
}

#[derive(Parser)]
#[command(
    name = "plumb",
    version,
    about = "Compile plumb source files to JavaScript.",
    long_about = "Check, optimize, and translate a plumb program. The JavaScript goes to stdout unless --output is given."
)]
struct Cli {
    /// Path to a plumb source file.
    input: PathBuf,

    /// What to write once compilation succeeds.
    #[arg(long, value_enum, default_value_t = Emit::Js)]
    emit: Emit,

    /// Write the output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dump the token stream produced by the lexer.
    #[arg(long)]
    dump_tokens: bool,

    /// Skip constant folding and dead-code removal.
    #[arg(long)]
    no_optimize: bool,

    /// Run a single optimizer round instead of iterating to a fixed point.
    #[arg(long)]
    single_pass: bool,

    /// Log compiler passes at debug level (RUST_LOG takes precedence).
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let contents = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read {:?}", cli.input))?;

    let source = SourceFile::new(SourceId(0), cli.input.clone(), contents);
    let line_cache: Vec<&str> = source.contents.lines().collect();
    let mut compiler = Compiler::new(CompileOptions {
        dump_tokens: cli.dump_tokens,
        optimize: !cli.no_optimize,
        fixed_point: !cli.single_pass,
        ..CompileOptions::default()
    });

    let compilation = match compiler.compile(&source) {
        Ok(compilation) => compilation,
        Err(err) => {
            if !compiler.diagnostics().is_empty() {
                eprintln!("Diagnostics:");
                for diagnostic in compiler.diagnostics().entries() {
                    print_diagnostic(&source, &line_cache, diagnostic);
                }
            }
            return Err(err.context("Compilation failed"));
        }
    };
    debug!(rounds = compilation.optimizer_rounds, "compiled {}", cli.input.display());

    let rendered = render(&compilation, cli.emit);
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
            fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

fn render(compilation: &Compilation, emit: Emit) -> String {
    match emit {
        Emit::Js => compilation.emit_javascript(),
        Emit::Ast => format!("{:#?}\n", compilation.program),
        Emit::Pipes => compilation.describe_pipelines(),
        Emit::Tokens => compilation
            .tokens
            .iter()
            .map(|token| format!("{token:?}\n"))
            .collect(),
    }
}

fn print_diagnostic(source: &SourceFile, lines: &[&str], diagnostic: &Diagnostic) {
    let (level_label, level_marker) = match diagnostic.level {
        DiagnosticLevel::Error => ("error", "  -"),
    };
    eprintln!("{} {}: {}", level_marker, level_label, diagnostic.message);
    let Some(span) = diagnostic.span else {
        return;
    };
    eprintln!("     --> {}:{}:{}", source.path.display(), span.line, span.column);

    let Some(raw_line) = lines.get(span.line.saturating_sub(1)) else {
        return;
    };
    let display_line = raw_line.replace('\t', "    ");
    eprintln!("      {}", display_line);

    let mut caret_line = String::from("      ");
    for ch in raw_line.chars().take(span.column.saturating_sub(1)) {
        match ch {
            '\t' => caret_line.push_str("    "),
            _ => caret_line.push(' '),
        }
    }

    let highlight_len = if span.end_line == span.line {
        span.end_column
            .saturating_sub(span.column)
            .saturating_add(1)
    } else {
        let width = display_line.chars().count();
        width.saturating_sub(span.column.saturating_sub(1).min(width))
    };
    caret_line.push_str(&"^".repeat(highlight_len.max(1)));
    eprintln!("{}", caret_line);
}
