//! Crate root: wires together the compilation pipeline.
//!
//! The stages run strictly one after another, each consuming the complete
//! output of the previous one:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the program AST.
//! - `fold` simplifies the AST with constant folding and registers labels.
//! - `codegen` lowers the folded AST into stack-machine assembly text.
//! - `context` holds the variable table, label set and synthetic label
//!   counters shared by folding and emission.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod context;
pub mod error;
pub mod fold;
pub mod parser;
pub mod tokenizer;

use tracing::info_span;

pub use ast::Program;
pub use context::Context;
pub use error::{CompileError, CompileResult};

/// Run tokenizer, parser and folding, returning the folded program.
pub fn front_end(source: &str, ctx: &mut Context) -> CompileResult<Program> {
  let tokens = tokenizer::tokenize(source)?;
  let program = parser::parse(tokens, source)?;
  program.fold(ctx)
}

/// Compile a program using `ctx` for symbol state.
pub fn compile(source: &str, ctx: &mut Context) -> CompileResult<String> {
  let _span = info_span!("compile", bytes = source.len()).entered();
  let program = front_end(source, ctx)?;
  codegen::generate(&program, ctx)
}

/// Compile a source string into assembly with a fresh context.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  compile(source, &mut Context::new())
}
