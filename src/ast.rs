//! Syntax tree shared by the parser, the folding pass and the emitter.
//!
//! The tree is owned top-down: every node exclusively owns its children, so
//! the folding pass can consume a subtree and hand back its simplified form.

use crate::tokenizer::{ArithmeticOp, RelOp};

/// Arithmetic expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Num(i16),
  Var(char),
  Rnd,
  Unary {
    op: ArithmeticOp,
    operand: Box<Expr>,
  },
  Binary {
    op: ArithmeticOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  pub fn unary(op: ArithmeticOp, operand: Expr) -> Self {
    Self::Unary {
      op,
      operand: Box::new(operand),
    }
  }

  pub fn binary(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }
}

/// Condition of an `IF`.
///
/// `Bool` only exists as the result of folding a relation between literals;
/// the emitter rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
  Relation { op: RelOp, lhs: Expr, rhs: Expr },
  Bool(bool),
}

impl Condition {
  pub fn relation(op: RelOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Relation { op, lhs, rhs }
  }
}

/// One argument of a `PRINT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintItem {
  Text(String),
  Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  /// A statement with an optional label directive in front of it.
  Labeled {
    label: Option<char>,
    stmt: Box<Stmt>,
  },
  Print(Vec<PrintItem>),
  If {
    cond: Condition,
    then: Box<Stmt>,
  },
  Goto {
    label: char,
    subroutine: bool,
  },
  Input(Vec<char>),
  Let {
    id: char,
    expr: Expr,
  },
  Asm(String),
  Return,
  End,
  NoOp,
  /// Result of folding an `IF` that can never be taken but whose body
  /// declares a label: the body is skipped, the label stays reachable.
  /// `label` is `None` when the label lives inside `ASM` text.
  JumpOver {
    label: Option<char>,
    stmt: Box<Stmt>,
  },
}

impl Stmt {
  pub fn labeled(label: Option<char>, stmt: Stmt) -> Self {
    Self::Labeled {
      label,
      stmt: Box::new(stmt),
    }
  }

  pub fn if_then(cond: Condition, then: Stmt) -> Self {
    Self::If {
      cond,
      then: Box::new(then),
    }
  }
}

/// A whole program in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub stmts: Vec<Stmt>,
}

impl Program {
  pub fn new(stmts: Vec<Stmt>) -> Self {
    Self { stmts }
  }

  /// Iterate statements in order.
  pub fn iter(&self) -> std::slice::Iter<'_, Stmt> {
    self.stmts.iter()
  }
}
