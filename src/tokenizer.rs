//! Lexical analysis: turns the program text into a vector of tokens.
//!
//! Each token kind owns a small matcher that tries to consume itself from the
//! front of the remaining input. The tokenizer trims whitespace and `//`
//! comments, then asks the matchers in a fixed priority order and keeps the
//! first hit. Keywords are tried before identifiers and labels, which is what
//! makes them reserved words.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{CompileError, CompileResult, Position};

/// `+ - * /`. Only the additive operators may appear in unary position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithmeticOp {
  Add,
  Subtract,
  Multiply,
  Divide,
}

impl ArithmeticOp {
  pub fn is_unary(self) -> bool {
    matches!(self, Self::Add | Self::Subtract)
  }

  /// Evaluate with 16-bit wraparound. `None` means division by zero.
  pub fn apply(self, lhs: i16, rhs: i16) -> Option<i16> {
    match self {
      Self::Add => Some(lhs.wrapping_add(rhs)),
      Self::Subtract => Some(lhs.wrapping_sub(rhs)),
      Self::Multiply => Some(lhs.wrapping_mul(rhs)),
      Self::Divide => (rhs != 0).then(|| lhs.wrapping_div(rhs)),
    }
  }

  pub fn symbol(self) -> char {
    match self {
      Self::Add => '+',
      Self::Subtract => '-',
      Self::Multiply => '*',
      Self::Divide => '/',
    }
  }

  fn from_char(c: char) -> Option<Self> {
    match c {
      '+' => Some(Self::Add),
      '-' => Some(Self::Subtract),
      '*' => Some(Self::Multiply),
      '/' => Some(Self::Divide),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
  Print,
  If,
  Then,
  Goto,
  Input,
  Let,
  Gosub,
  Return,
  End,
  Rnd,
  Asm,
}

impl Keyword {
  /// Match order used by the tokenizer.
  pub const ALL: [Keyword; 11] = [
    Self::Print,
    Self::If,
    Self::Then,
    Self::Goto,
    Self::Input,
    Self::Let,
    Self::Gosub,
    Self::Return,
    Self::End,
    Self::Rnd,
    Self::Asm,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Print => "PRINT",
      Self::If => "IF",
      Self::Then => "THEN",
      Self::Goto => "GOTO",
      Self::Input => "INPUT",
      Self::Let => "LET",
      Self::Gosub => "GOSUB",
      Self::Return => "RETURN",
      Self::End => "END",
      Self::Rnd => "RND",
      Self::Asm => "ASM",
    }
  }
}

/// Relational operators usable in an `IF` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
  Gt,
  Lt,
  Eq,
  Ne,
  Ge,
  Le,
}

impl RelOp {
  /// The operator testing the opposite condition.
  pub fn negate(self) -> Self {
    match self {
      Self::Gt => Self::Le,
      Self::Lt => Self::Ge,
      Self::Eq => Self::Ne,
      Self::Ne => Self::Eq,
      Self::Ge => Self::Lt,
      Self::Le => Self::Gt,
    }
  }

  pub fn holds(self, lhs: i16, rhs: i16) -> bool {
    match self {
      Self::Gt => lhs > rhs,
      Self::Lt => lhs < rhs,
      Self::Eq => lhs == rhs,
      Self::Ne => lhs != rhs,
      Self::Ge => lhs >= rhs,
      Self::Le => lhs <= rhs,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Gt => ">",
      Self::Lt => "<",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Ge => ">=",
      Self::Le => "<=",
    }
  }
}

/// Kinds of tokens recognised by the front-end, with their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
  Number(i16),
  Arith(ArithmeticOp),
  Keyword(Keyword),
  RelOp(RelOp),
  Str(String),
  Id(char),
  Label(char),
  LeftParen,
  RightParen,
  Comma,
  EqAssign,
  Eof,
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Number(value) => write!(f, "{value}"),
      Self::Arith(op) => write!(f, "{}", op.symbol()),
      Self::Keyword(keyword) => f.write_str(keyword.as_str()),
      Self::RelOp(op) => f.write_str(op.as_str()),
      Self::Str(text) => write!(f, "\"{text}\""),
      Self::Id(name) | Self::Label(name) => write!(f, "{name}"),
      Self::LeftParen => f.write_str("("),
      Self::RightParen => f.write_str(")"),
      Self::Comma => f.write_str(","),
      Self::EqAssign => f.write_str("="),
      Self::Eof => f.write_str("EOF"),
    }
  }
}

/// A token plus the byte range of source that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub loc: usize,
  pub len: usize,
}

impl Token {
  pub fn new(kind: TokenKind, loc: usize, len: usize) -> Self {
    Self { kind, loc, len }
  }
}

/// A matcher returns the token it recognised and how many bytes it consumed.
type Matcher = fn(&str) -> Option<(TokenKind, usize)>;

const MATCHERS: [Matcher; 11] = [
  match_number,
  match_arith,
  match_keyword,
  match_relop,
  match_string,
  match_id,
  match_label,
  match_left_paren,
  match_right_paren,
  match_comma,
  match_eq_assign,
];

fn match_number(rest: &str) -> Option<(TokenKind, usize)> {
  let len = rest.bytes().take_while(u8::is_ascii_digit).count();
  if len == 0 {
    return None;
  }
  let value = rest[..len].parse::<i16>().ok()?;
  Some((TokenKind::Number(value), len))
}

fn match_arith(rest: &str) -> Option<(TokenKind, usize)> {
  let op = ArithmeticOp::from_char(rest.chars().next()?)?;
  Some((TokenKind::Arith(op), 1))
}

fn match_keyword(rest: &str) -> Option<(TokenKind, usize)> {
  Keyword::ALL
    .into_iter()
    .find(|keyword| rest.starts_with(keyword.as_str()))
    .map(|keyword| (TokenKind::Keyword(keyword), keyword.as_str().len()))
}

fn match_relop(rest: &str) -> Option<(TokenKind, usize)> {
  // Two-character operators first so `>=` never lexes as `>` then `=`.
  [RelOp::Ge, RelOp::Le, RelOp::Eq, RelOp::Ne, RelOp::Gt, RelOp::Lt]
    .into_iter()
    .find(|op| rest.starts_with(op.as_str()))
    .map(|op| (TokenKind::RelOp(op), op.as_str().len()))
}

fn match_string(rest: &str) -> Option<(TokenKind, usize)> {
  let body = rest.strip_prefix('"')?;
  let end = body.find('"')?;
  Some((TokenKind::Str(body[..end].to_string()), end + 2))
}

fn match_id(rest: &str) -> Option<(TokenKind, usize)> {
  let c = rest.chars().next().filter(char::is_ascii_uppercase)?;
  Some((TokenKind::Id(c), 1))
}

fn match_label(rest: &str) -> Option<(TokenKind, usize)> {
  let c = rest.chars().next().filter(char::is_ascii_lowercase)?;
  Some((TokenKind::Label(c), 1))
}

fn match_char(rest: &str, expected: char, kind: TokenKind) -> Option<(TokenKind, usize)> {
  rest.starts_with(expected).then_some((kind, 1))
}

fn match_left_paren(rest: &str) -> Option<(TokenKind, usize)> {
  match_char(rest, '(', TokenKind::LeftParen)
}

fn match_right_paren(rest: &str) -> Option<(TokenKind, usize)> {
  match_char(rest, ')', TokenKind::RightParen)
}

fn match_comma(rest: &str) -> Option<(TokenKind, usize)> {
  match_char(rest, ',', TokenKind::Comma)
}

fn match_eq_assign(rest: &str) -> Option<(TokenKind, usize)> {
  match_char(rest, '=', TokenKind::EqAssign)
}

/// Advance past whitespace and line comments, returning the new offset.
fn skip_trivia(input: &str, mut i: usize) -> usize {
  loop {
    let rest = &input[i..];
    let trimmed = rest.trim_start();
    i += rest.len() - trimmed.len();

    if !trimmed.starts_with("//") {
      return i;
    }
    i = match trimmed.find(['\n', '\r']) {
      Some(idx) => i + idx,
      None => input.len(),
    };
  }
}

/// Lex the input into a flat vector of tokens terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let mut i = skip_trivia(input, 0);

  while i < input.len() {
    let rest = &input[i..];
    let Some((kind, len)) = MATCHERS.iter().find_map(|matcher| matcher(rest)) else {
      let remainder = rest.lines().next().unwrap_or(rest).to_string();
      return Err(CompileError::Lexical {
        position: Position::new(input, i),
        remainder,
      });
    };
    trace!(%kind, loc = i, "token");
    tokens.push(Token::new(kind, i, len));
    i = skip_trivia(input, i + len);
  }

  tokens.push(Token::new(TokenKind::Eof, input.len(), 0));
  debug!(count = tokens.len(), "tokenized program");
  Ok(tokens)
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>) -> String {
  match token {
    Some(t) => t.kind.to_string(),
    None => "EOF".to_string(),
  }
}
