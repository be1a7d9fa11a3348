//! Constant folding.
//!
//! Every node folds its children first and then simplifies itself. Folding
//! consumes the node and returns its replacement, so a statement can turn
//! into a different kind of statement (an `IF` with a constant condition
//! becomes its body, a jump-over, or nothing at all).
//!
//! Label declarations are registered here rather than during emission so a
//! `GOTO` may jump forward to a label that has not been emitted yet.

use std::sync::LazyLock;

use regex::Regex;
use snafu::{OptionExt, ensure};
use tracing::{debug, trace};

use crate::ast::{Condition, Expr, PrintItem, Program, Stmt};
use crate::context::{Context, SYNTHETIC_LABEL_PREFIX, USER_LABEL_PREFIX};
use crate::error::{CompileError, CompileResult, DivisionByZeroSnafu, ReservedLabelSnafu};
use crate::tokenizer::ArithmeticOp;

/// Label declarations written by hand inside an `ASM` string.
static ASM_USER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(&format!(
    r"\.(?:lbl|label)\({}([a-z])\)",
    regex::escape(USER_LABEL_PREFIX)
  ))
  .expect("user label pattern is valid")
});

impl Expr {
  pub fn fold(self) -> CompileResult<Expr> {
    match self {
      Expr::Binary { op, lhs, rhs } => fold_binary(op, (*lhs).fold()?, (*rhs).fold()?),
      Expr::Unary { op, operand } => {
        let operand = (*operand).fold()?;
        match (op, operand) {
          (ArithmeticOp::Add, Expr::Num(value)) => Ok(Expr::Num(value)),
          (ArithmeticOp::Subtract, Expr::Num(value)) => Ok(Expr::Num(value.wrapping_neg())),
          (ArithmeticOp::Multiply | ArithmeticOp::Divide, _) => Err(CompileError::internal(
            format!("\"{}\" used as a unary operator", op.symbol()),
          )),
          (op, operand) => Ok(Expr::unary(op, operand)),
        }
      }
      Expr::Num(_) | Expr::Var(_) | Expr::Rnd => Ok(self),
    }
  }
}

fn fold_binary(op: ArithmeticOp, lhs: Expr, rhs: Expr) -> CompileResult<Expr> {
  if let (Expr::Num(a), Expr::Num(b)) = (&lhs, &rhs) {
    let value = op.apply(*a, *b).context(DivisionByZeroSnafu)?;
    return Ok(Expr::Num(value));
  }

  let lhs_zero = lhs == Expr::Num(0);
  let rhs_zero = rhs == Expr::Num(0);
  if !lhs_zero && !rhs_zero {
    return Ok(Expr::binary(op, lhs, rhs));
  }

  // Exactly one side is a literal zero.
  match op {
    ArithmeticOp::Add if lhs_zero => Ok(rhs),
    ArithmeticOp::Add => Ok(lhs),
    ArithmeticOp::Subtract if lhs_zero => Ok(Expr::unary(ArithmeticOp::Subtract, rhs)),
    ArithmeticOp::Subtract => Ok(lhs),
    ArithmeticOp::Multiply => Ok(Expr::Num(0)),
    ArithmeticOp::Divide => {
      ensure!(lhs_zero, DivisionByZeroSnafu);
      Ok(Expr::Num(0))
    }
  }
}

impl Condition {
  pub fn fold(self) -> CompileResult<Condition> {
    match self {
      Condition::Relation { op, lhs, rhs } => {
        let lhs = lhs.fold()?;
        let rhs = rhs.fold()?;
        if let (Expr::Num(a), Expr::Num(b)) = (&lhs, &rhs) {
          return Ok(Condition::Bool(op.holds(*a, *b)));
        }
        Ok(Condition::Relation { op, lhs, rhs })
      }
      Condition::Bool(_) => Ok(self),
    }
  }
}

impl Stmt {
  pub fn fold(self, ctx: &mut Context) -> CompileResult<Stmt> {
    match self {
      Stmt::Labeled { label, stmt } => {
        if let Some(label) = label {
          ctx.declare_label(label)?;
        }
        let stmt = (*stmt).fold(ctx)?;
        Ok(match label {
          Some(_) => Stmt::labeled(label, stmt),
          None => stmt,
        })
      }
      Stmt::If { cond, then } => {
        let cond = cond.fold()?;
        let then = (*then).fold(ctx)?;
        match cond {
          Condition::Bool(true) => Ok(then),
          Condition::Bool(false) => Ok(reachable_by_label(then).unwrap_or(Stmt::NoOp)),
          cond @ Condition::Relation { .. } => Ok(Stmt::if_then(cond, then)),
        }
      }
      Stmt::Print(items) => {
        let items = items
          .into_iter()
          .map(|item| match item {
            PrintItem::Expr(expr) => Ok(match expr.fold()? {
              Expr::Num(value) => PrintItem::Text(value.to_string()),
              expr => PrintItem::Expr(expr),
            }),
            text @ PrintItem::Text(_) => Ok(text),
          })
          .collect::<CompileResult<Vec<_>>>()?;
        Ok(Stmt::Print(items))
      }
      // Unused assignments are kept; there is no data-flow analysis.
      Stmt::Let { id, expr } => Ok(Stmt::Let {
        id,
        expr: expr.fold()?,
      }),
      Stmt::Asm(text) => {
        check_inline_asm(&text, ctx)?;
        Ok(Stmt::Asm(text))
      }
      Stmt::JumpOver { label, stmt } => {
        if let Some(label) = label {
          ctx.declare_label(label)?;
        }
        Ok(Stmt::JumpOver {
          label,
          stmt: Box::new((*stmt).fold(ctx)?),
        })
      }
      Stmt::Goto { .. } | Stmt::Input(_) | Stmt::Return | Stmt::End | Stmt::NoOp => Ok(self),
    }
  }

  /// True for `END`, possibly behind label wrappers.
  fn is_end(&self) -> bool {
    match self {
      Stmt::End => true,
      Stmt::Labeled { stmt, .. } => stmt.is_end(),
      _ => false,
    }
  }

  /// True for statements that emit no code of their own.
  fn is_empty(&self) -> bool {
    match self {
      Stmt::NoOp => true,
      Stmt::Labeled { stmt, .. } => stmt.is_empty(),
      _ => false,
    }
  }
}

/// The part of a never-taken `IF` body that a jump to one of its labels can
/// still reach, wrapped so normal flow skips it. `None` when the body
/// declares no label at all.
fn reachable_by_label(then: Stmt) -> Option<Stmt> {
  match then {
    Stmt::Labeled {
      label: Some(label),
      stmt,
    } => Some(Stmt::JumpOver {
      label: Some(label),
      stmt,
    }),
    // Code in front of the first label can only be entered from the top.
    Stmt::Labeled { label: None, stmt } | Stmt::If { then: stmt, .. } => reachable_by_label(*stmt),
    jump @ Stmt::JumpOver { .. } => Some(jump),
    Stmt::Asm(text) if ASM_USER_LABEL.is_match(&text) => Some(Stmt::JumpOver {
      label: None,
      stmt: Box::new(Stmt::Asm(text)),
    }),
    _ => None,
  }
}

fn check_inline_asm(text: &str, ctx: &mut Context) -> CompileResult<()> {
  let reserved = [".lbl(", ".label("]
    .iter()
    .any(|directive| text.contains(&format!("{directive}{SYNTHETIC_LABEL_PREFIX}")));
  ensure!(
    !reserved,
    ReservedLabelSnafu {
      prefix: SYNTHETIC_LABEL_PREFIX,
      text
    }
  );

  for caps in ASM_USER_LABEL.captures_iter(text) {
    if let Some(label) = caps[1].chars().next() {
      trace!(%label, "label declared in inline assembly");
      ctx.declare_label(label)?;
    }
  }
  Ok(())
}

impl Program {
  pub fn fold(self, ctx: &mut Context) -> CompileResult<Program> {
    let mut stmts = self
      .stmts
      .into_iter()
      .map(|stmt| stmt.fold(ctx))
      .collect::<CompileResult<Vec<_>>>()?;

    // The emitter always appends an END, so any END already at the tail of
    // the program is redundant. Labels in front of them stay in place.
    let mut removed = 0;
    for stmt in stmts.iter_mut().rev() {
      if stmt.is_empty() {
        continue;
      }
      if !stmt.is_end() {
        break;
      }
      strip_end(stmt);
      removed += 1;
    }

    debug!(statements = stmts.len(), trailing_ends = removed, "folded program");
    Ok(Program::new(stmts))
  }
}

fn strip_end(stmt: &mut Stmt) {
  match stmt {
    Stmt::Labeled { stmt, .. } => strip_end(stmt),
    _ => *stmt = Stmt::NoOp,
  }
}
