//! Shared error utilities used across the compilation pipeline.
//!
//! Every stage is fail-fast: the first problem aborts the whole compilation
//! and surfaces as one `CompileError`. Lexical and syntactic diagnostics point
//! at the offending byte with a caret under the source line; the semantic
//! errors raised while folding and emitting name the letter involved instead,
//! since the AST does not keep source positions.

use std::fmt;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

/// Position of a diagnostic inside the program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
  pub line: usize,
  pub column: usize,
  pub source_line: String,
  pub marker: String,
}

impl Position {
  /// Resolve a byte offset into a 1-based line/column pair and build the caret
  /// marker for it.
  pub fn new(source: &str, loc: usize) -> Self {
    let mut safe_loc = loc.min(source.len());
    while !source.is_char_boundary(safe_loc) {
      safe_loc -= 1;
    }
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[safe_loc..]
      .find(['\n', '\r'])
      .map_or(source.len(), |idx| safe_loc + idx);
    let line = source[..line_start].matches('\n').count() + 1;
    let column = source[line_start..safe_loc].chars().count() + 1;
    let marker = format!("{}^", " ".repeat(column - 1));
    Self {
      line,
      column,
      source_line: source[line_start..line_end].to_string(),
      marker,
    }
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "line {}, column {}\n{}\n{}",
      self.line, self.column, self.source_line, self.marker
    )
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("invalid token \"{remainder}\" at {position}"))]
  Lexical { position: Position, remainder: String },

  #[snafu(display("{message} at {position}"))]
  Parse { position: Position, message: String },

  #[snafu(display("expected {expected}, but reached end of input at {position}"))]
  UnexpectedEof { position: Position, expected: String },

  #[snafu(display("label {label} cannot be declared more than once"))]
  DuplicateLabel { label: char },

  #[snafu(display("label {label} is referenced but never declared"))]
  UndefinedLabel { label: char },

  #[snafu(display("variable {name} is used before it is assigned"))]
  UninitializedVariable { name: char },

  #[snafu(display(
    "assembly labels beginning with {prefix} are reserved for the compiler: {text:?}"
  ))]
  ReservedLabel { prefix: &'static str, text: String },

  #[snafu(display("division by zero in a constant expression"))]
  DivisionByZero,

  #[snafu(display("internal compiler error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Construct a syntax error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    Self::Parse {
      position: Position::new(source, loc),
      message: message.into(),
    }
  }

  /// Construct an error for a compiler defect rather than a user mistake.
  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }

  /// True when the error signals a broken invariant inside the compiler.
  pub fn is_internal(&self) -> bool {
    matches!(self, Self::Internal { .. })
  }

  /// Source position of lexical and syntactic errors.
  pub fn position(&self) -> Option<&Position> {
    match self {
      Self::Lexical { position, .. }
      | Self::Parse { position, .. }
      | Self::UnexpectedEof { position, .. } => Some(position),
      _ => None,
    }
  }
}
