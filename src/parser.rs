//! Recursive-descent parser producing the program AST.
//!
//! A single forward cursor walks the token vector; there is no backtracking
//! and no recovery, the first mismatch aborts the parse. Grammar:
//!
//! ```text
//! program          := { labeledStatement } EOF
//! labeledStatement := [ Label ] statement
//! statement        := PRINT exprList | IF cond THEN labeledStatement
//!                   | GOTO Label | GOSUB Label | INPUT idList
//!                   | LET Id '=' expr | RETURN | END | ASM Str
//! cond             := expr relOp expr
//! exprList         := (Str | expr) { ',' (Str | expr) }
//! expr             := [ '+' | '-' ] term { ('+' | '-') term }
//! term             := factor { ('*' | '/') factor }
//! factor           := Number | Id | RND | '(' expr ')'
//! ```

use tracing::{debug, trace};

use crate::ast::{Condition, Expr, PrintItem, Program, Stmt};
use crate::error::{CompileError, CompileResult, Position};
use crate::tokenizer::{ArithmeticOp, Keyword, Token, TokenKind, describe_token};

/// Parse a whole program from the token stream.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens, source);
  let mut stmts = Vec::new();

  while !stream.is_eof() {
    let stmt = parse_labeled_stmt(&mut stream)?;
    trace!(?stmt, "statement");
    stmts.push(stmt);
  }

  debug!(statements = stmts.len(), "parsed program");
  Ok(Program::new(stmts))
}

fn parse_labeled_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let label = match stream.peek_kind() {
    Some(TokenKind::Label(label)) => {
      let label = *label;
      stream.advance();
      Some(label)
    }
    _ => None,
  };
  let stmt = parse_stmt(stream)?;
  Ok(Stmt::labeled(label, stmt))
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let keyword = match stream.peek_kind() {
    Some(TokenKind::Keyword(keyword)) => *keyword,
    _ => return Err(stream.unexpected("a statement keyword")),
  };

  let parse_rest: fn(&mut TokenStream) -> CompileResult<Stmt> = match keyword {
    Keyword::Print => |stream| Ok(Stmt::Print(parse_print_list(stream)?)),
    Keyword::If => parse_if,
    Keyword::Goto => |stream| parse_goto(stream, false),
    Keyword::Gosub => |stream| parse_goto(stream, true),
    Keyword::Input => |stream| Ok(Stmt::Input(parse_id_list(stream)?)),
    Keyword::Let => parse_let,
    Keyword::Return => |_| Ok(Stmt::Return),
    Keyword::End => |_| Ok(Stmt::End),
    Keyword::Asm => parse_asm,
    Keyword::Then => {
      return Err(stream.error_here("dangling THEN outside of an IF statement"));
    }
    Keyword::Rnd => {
      return Err(stream.error_here("RND is a number and cannot begin a statement"));
    }
  };

  stream.advance();
  parse_rest(stream)
}

fn parse_print_list(stream: &mut TokenStream) -> CompileResult<Vec<PrintItem>> {
  let mut items = vec![parse_print_item(stream)?];
  while stream.equal(&TokenKind::Comma) {
    items.push(parse_print_item(stream)?);
  }
  Ok(items)
}

fn parse_print_item(stream: &mut TokenStream) -> CompileResult<PrintItem> {
  if let Some(TokenKind::Str(text)) = stream.peek_kind() {
    let text = text.clone();
    stream.advance();
    return Ok(PrintItem::Text(text));
  }
  Ok(PrintItem::Expr(parse_expr(stream)?))
}

fn parse_if(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let lhs = parse_expr(stream)?;
  let op = match stream.peek_kind() {
    Some(TokenKind::RelOp(op)) => *op,
    _ => return Err(stream.unexpected("a relational operator")),
  };
  stream.advance();
  let rhs = parse_expr(stream)?;
  stream.skip(&TokenKind::Keyword(Keyword::Then))?;
  let then = parse_labeled_stmt(stream)?;
  Ok(Stmt::if_then(Condition::relation(op, lhs, rhs), then))
}

fn parse_goto(stream: &mut TokenStream, subroutine: bool) -> CompileResult<Stmt> {
  let label = stream.get_label()?;
  Ok(Stmt::Goto { label, subroutine })
}

fn parse_id_list(stream: &mut TokenStream) -> CompileResult<Vec<char>> {
  let mut ids = vec![stream.get_ident()?];
  while stream.equal(&TokenKind::Comma) {
    ids.push(stream.get_ident()?);
  }
  Ok(ids)
}

fn parse_let(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let id = stream.get_ident()?;
  stream.skip(&TokenKind::EqAssign)?;
  let expr = parse_expr(stream)?;
  Ok(Stmt::Let { id, expr })
}

fn parse_asm(stream: &mut TokenStream) -> CompileResult<Stmt> {
  match stream.peek_kind() {
    Some(TokenKind::Str(text)) => {
      let text = text.clone();
      stream.advance();
      Ok(Stmt::Asm(text))
    }
    _ => Err(stream.unexpected("a string of assembly code after ASM")),
  }
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  // A sign is only accepted in front of the first term.
  let sign = match stream.peek_kind() {
    Some(TokenKind::Arith(op)) if op.is_unary() => {
      let op = *op;
      stream.advance();
      Some(op)
    }
    Some(TokenKind::Arith(_)) => {
      return Err(stream.error_here("multiplication and division are not unary operators"));
    }
    _ => None,
  };

  let mut node = parse_term(stream)?;
  if let Some(op) = sign {
    node = Expr::unary(op, node);
  }

  loop {
    let op = match stream.peek_kind() {
      Some(TokenKind::Arith(op @ (ArithmeticOp::Add | ArithmeticOp::Subtract))) => *op,
      _ => break,
    };
    stream.advance();
    let rhs = parse_term(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_term(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_factor(stream)?;

  loop {
    let op = match stream.peek_kind() {
      Some(TokenKind::Arith(op @ (ArithmeticOp::Multiply | ArithmeticOp::Divide))) => *op,
      _ => break,
    };
    stream.advance();
    let rhs = parse_factor(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  Ok(node)
}

fn parse_factor(stream: &mut TokenStream) -> CompileResult<Expr> {
  let node = match stream.peek_kind() {
    Some(TokenKind::Number(value)) => Expr::Num(*value),
    Some(TokenKind::Id(name)) => Expr::Var(*name),
    Some(TokenKind::Keyword(Keyword::Rnd)) => Expr::Rnd,
    Some(TokenKind::LeftParen) => {
      stream.advance();
      let node = parse_expr(stream)?;
      stream.skip(&TokenKind::RightParen)?;
      return Ok(node);
    }
    _ => return Err(stream.unexpected("a number, a variable, RND or \"(\"")),
  };
  stream.advance();
  Ok(node)
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> Option<&TokenKind> {
    self.peek().map(|token| &token.kind)
  }

  fn advance(&mut self) {
    self.pos += 1;
  }

  /// Consume the current token if it is exactly `kind`.
  fn equal(&mut self, kind: &TokenKind) -> bool {
    if self.peek_kind() == Some(kind) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn skip(&mut self, kind: &TokenKind) -> CompileResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      Err(self.unexpected(&format!("\"{kind}\"")))
    }
  }

  /// Parse the current token as a variable name.
  fn get_ident(&mut self) -> CompileResult<char> {
    if let Some(TokenKind::Id(name)) = self.peek_kind() {
      let name = *name;
      self.pos += 1;
      return Ok(name);
    }
    Err(self.unexpected("a variable name"))
  }

  /// Parse the current token as a label.
  fn get_label(&mut self) -> CompileResult<char> {
    if let Some(TokenKind::Label(label)) = self.peek_kind() {
      let label = *label;
      self.pos += 1;
      return Ok(label);
    }
    Err(self.unexpected("a label"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
  }

  fn error_here(&self, message: &str) -> CompileError {
    let loc = self.peek().map_or(self.source.len(), |token| token.loc);
    CompileError::at(self.source, loc, format!("{message} (token {})", self.pos))
  }

  /// Report that `expected` was wanted at the cursor. Running into the end
  /// of input is reported separately from a mismatched token.
  fn unexpected(&self, expected: &str) -> CompileError {
    match self.peek() {
      Some(token) if token.kind != TokenKind::Eof => {
        let got = describe_token(Some(token));
        CompileError::at(
          self.source,
          token.loc,
          format!("expected {expected}, but got \"{got}\" (token {})", self.pos),
        )
      }
      _ => CompileError::UnexpectedEof {
        position: Position::new(self.source, self.source.len()),
        expected: expected.to_string(),
      },
    }
  }
}
