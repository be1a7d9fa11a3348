//! Code generation: lower the folded AST into stack-machine assembly.
//!
//! The target works on an operand stack of bytes with 16-bit (`2`-suffixed)
//! variants of most instructions. Every expression leaves one 16-bit value on
//! the stack, low byte first so the high byte ends up on top; `LIT2 #hh #ll`
//! pushes the value `0xhhll` that way. Devices are memory-mapped at the top
//! of memory: the console byte at `#ff09`, the random source at `#ff02`, and
//! the halt register at `#ff0f`. Variables live just below them.
//!
//! The machine only multiplies and divides unsigned values, so signed `*`
//! and `/` are lowered as: predict the sign of the result from the operand
//! signs, take both magnitudes, operate, then negate the result when needed.

use snafu::OptionExt;
use tracing::{debug, trace};

use crate::ast::{Condition, Expr, PrintItem, Program, Stmt};
use crate::context::{Context, user_label};
use crate::error::{CompileError, CompileResult, UninitializedVariableSnafu};
use crate::tokenizer::{ArithmeticOp, RelOp};

/// `0 - n` for the 16-bit value on top of the stack.
const NEGATE: &str = "LIT2 #00 #00 SWP2 SEC SBC2";

/// Write the byte on top of the stack to the console.
const WRITE_CONSOLE: &str = "LIT2 #ff #09 STA";

const HALT: &str = "LIT #00 LIT2 #ff #0f STA #ef";

const READ_RANDOM: &str = "LIT2 #ff #02 LDA LIT #00";

/// Flip the sign bit of the 16-bit value on top of the stack.
const SIGN_BIAS: &str = "LIT2 #80 #00 XOR2";

/// Emit assembly for a folded program, terminated by an implicit `END`.
pub fn generate(program: &Program, ctx: &mut Context) -> CompileResult<String> {
  let mut asm = String::new();

  for stmt in program.iter() {
    emit_stmt(stmt, ctx, &mut asm)?;
    end_line(&mut asm);
  }
  emit_stmt(&Stmt::End, ctx, &mut asm)?;
  end_line(&mut asm);

  debug!(bytes = asm.len(), "generated assembly");
  Ok(asm)
}

/// Append one instruction group to the current line.
fn op(asm: &mut String, text: &str) {
  if !asm.is_empty() && !asm.ends_with('\n') {
    asm.push(' ');
  }
  asm.push_str(text);
}

/// Finish the current line, if anything was written to it.
fn end_line(asm: &mut String) {
  if !asm.is_empty() && !asm.ends_with('\n') {
    asm.push('\n');
  }
}

fn emit_label(name: &str, asm: &mut String) {
  end_line(asm);
  op(asm, &format!(".lbl({name})"));
  end_line(asm);
}

/// Jump to `label` when the byte on top of the stack is non-zero.
fn jump_if_nonzero(label: &str, asm: &mut String) {
  op(asm, &format!("LIT2 .absc({label}) JNZ2"));
}

fn emit_stmt(stmt: &Stmt, ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  trace!(?stmt, "emit");
  match stmt {
    Stmt::Labeled { label, stmt } => {
      if let Some(label) = label {
        emit_user_label(*label, ctx, asm)?;
      }
      emit_stmt(stmt, ctx, asm)
    }
    Stmt::Print(items) => emit_print(items, ctx, asm),
    Stmt::If { cond, then } => {
      let Condition::Relation { op: relation, lhs, rhs } = cond else {
        return Err(CompileError::internal(
          "constant IF condition survived folding",
        ));
      };
      let skip = ctx.branch_label();
      emit_relation(relation.negate(), lhs, rhs, ctx, asm)?;
      jump_if_nonzero(&skip, asm);
      end_line(asm);
      emit_stmt(then, ctx, asm)?;
      emit_label(&skip, asm);
      Ok(())
    }
    Stmt::JumpOver { label, stmt } => {
      let skip = ctx.jump_over_label();
      op(asm, &format!("LIT2 .absc({skip}) JMP2"));
      end_line(asm);
      if let Some(label) = label {
        emit_user_label(*label, ctx, asm)?;
      }
      emit_stmt(stmt, ctx, asm)?;
      emit_label(&skip, asm);
      Ok(())
    }
    Stmt::Goto { label, subroutine } => {
      if !ctx.is_declared(*label) {
        return Err(CompileError::UndefinedLabel { label: *label });
      }
      let jump = if *subroutine { "JSR2" } else { "JMP2" };
      op(asm, &format!("LIT2 .absc({}) {jump}", user_label(*label)));
      Ok(())
    }
    Stmt::Input(ids) => {
      // Reading input is not supported yet: every variable is set to zero.
      for id in ids {
        emit_assign(*id, &Expr::Num(0), ctx, asm)?;
        end_line(asm);
      }
      Ok(())
    }
    Stmt::Let { id, expr } => emit_assign(*id, expr, ctx, asm),
    Stmt::Asm(text) => {
      end_line(asm);
      asm.push_str(text);
      end_line(asm);
      Ok(())
    }
    Stmt::Return => {
      op(asm, "JMPr2");
      Ok(())
    }
    Stmt::End => {
      op(asm, HALT);
      Ok(())
    }
    Stmt::NoOp => Ok(()),
  }
}

fn emit_user_label(label: char, ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  ctx.place_label(label)?;
  emit_label(&user_label(label), asm);
  Ok(())
}

fn emit_assign(id: char, expr: &Expr, ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  emit_expr(expr, ctx, asm)?;
  let addr = ctx.allocate(id);
  emit_word(addr, asm);
  op(asm, "STA2");
  Ok(())
}

fn emit_print(items: &[PrintItem], ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  for item in items {
    match item {
      PrintItem::Text(text) => {
        for byte in text.bytes() {
          op(asm, &format!("LIT #{byte:02x} {WRITE_CONSOLE}"));
          end_line(asm);
        }
      }
      PrintItem::Expr(expr) => emit_print_number(expr, ctx, asm)?,
    }
  }
  op(asm, &format!("LIT #0a {WRITE_CONSOLE}"));
  Ok(())
}

/// Print a 16-bit signed value in decimal.
///
/// A zero byte is pushed as a terminator, then the magnitude is divided by
/// ten until the quotient is zero, leaving the ASCII digits on the stack
/// below the quotient, most significant digit last. The output loop writes
/// digits until the byte under the one just written is the terminator. A
/// negative value prints `-` before its magnitude.
fn emit_print_number(expr: &Expr, ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  let labels = ctx.print_labels();

  op(asm, "LIT #00");
  end_line(asm);
  emit_expr(expr, ctx, asm)?;
  end_line(asm);

  op(asm, "DUP LIT #07 SFT LIT #00 CLC SBC");
  jump_if_nonzero(&labels.digits, asm);
  end_line(asm);
  op(asm, NEGATE);
  end_line(asm);
  op(asm, &format!("LIT '- {WRITE_CONSOLE}"));
  emit_label(&labels.digits, asm);

  // Remainder digit goes under the quotient, which stays on top for the test.
  op(asm, "LIT2 #00 #0a DVM2 POP LIT #30 CLC ADC ROT ROT IORk");
  jump_if_nonzero(&labels.digits, asm);
  end_line(asm);
  op(asm, "POP POP");
  op(asm, &format!(".lbl({})", labels.output));
  end_line(asm);
  op(asm, &format!("{WRITE_CONSOLE} DUP"));
  jump_if_nonzero(&labels.output, asm);
  op(asm, "POP");
  end_line(asm);
  Ok(())
}

/// Push a 16-bit literal, written high byte first.
fn emit_word(word: u16, asm: &mut String) {
  let [hi, lo] = word.to_be_bytes();
  op(asm, &format!("LIT2 #{hi:02x} #{lo:02x}"));
}

/// Emit stack-based code for a single expression node.
fn emit_expr(expr: &Expr, ctx: &mut Context, asm: &mut String) -> CompileResult<()> {
  match expr {
    Expr::Num(value) => emit_word(*value as u16, asm),
    Expr::Var(name) => {
      let addr = ctx
        .address_of(*name)
        .context(UninitializedVariableSnafu { name: *name })?;
      emit_word(addr, asm);
      op(asm, "LDA2");
    }
    Expr::Rnd => op(asm, READ_RANDOM),
    Expr::Unary { op: sign, operand } => {
      emit_expr(operand, ctx, asm)?;
      match sign {
        ArithmeticOp::Add => {}
        ArithmeticOp::Subtract => op(asm, NEGATE),
        ArithmeticOp::Multiply | ArithmeticOp::Divide => {
          return Err(CompileError::internal(format!(
            "\"{}\" used as a unary operator",
            sign.symbol()
          )));
        }
      }
    }
    Expr::Binary {
      op: operator,
      lhs,
      rhs,
    } => {
      emit_expr(lhs, ctx, asm)?;
      emit_expr(rhs, ctx, asm)?;
      match operator {
        ArithmeticOp::Add => op(asm, "CLC ADC2"),
        ArithmeticOp::Subtract => op(asm, "SEC SBC2"),
        ArithmeticOp::Multiply => emit_signed_mul_div("MUL2", ctx, asm),
        ArithmeticOp::Divide => emit_signed_mul_div("DVM2 POP2", ctx, asm),
      }
    }
  }
  Ok(())
}

/// Signed multiply/divide of the two values on top of the stack.
fn emit_signed_mul_div(unsigned_op: &str, ctx: &mut Context, asm: &mut String) {
  let labels = ctx.arithmetic_labels();

  // Result sign flag (1 when the operand signs agree) goes below the operands.
  op(
    asm,
    "OVR2 SWP POP OVR XOR LIT #07 SFT LIT #01 XOR LIT #00 SWP2 ROT2",
  );
  emit_remove_sign(&labels.lhs_sign, asm);
  op(asm, "SWP2");
  emit_remove_sign(&labels.rhs_sign, asm);
  end_line(asm);

  op(asm, unsigned_op);
  op(asm, "SWP2 POP");
  jump_if_nonzero(&labels.result_sign, asm);
  op(asm, NEGATE);
  emit_label(&labels.result_sign, asm);
}

/// Replace the value on top of the stack with its magnitude.
fn emit_remove_sign(label: &str, asm: &mut String) {
  op(asm, "DUP LIT #07 SFT LIT #01 XOR");
  jump_if_nonzero(label, asm);
  end_line(asm);
  op(asm, NEGATE);
  emit_label(label, asm);
}

/// Push a 0/1 byte telling whether `lhs op rhs` holds.
///
/// `GTH2` (unsigned, second above top) and `EQU2` are the only comparisons
/// the machine has. Operands are pushed right-then-left and the other
/// relations are derived from those two; `NE` pushes left-then-right. For
/// ordering relations each operand gets its sign bit flipped first, which
/// turns the unsigned compare into a signed one.
fn emit_relation(
  relation: RelOp,
  lhs: &Expr,
  rhs: &Expr,
  ctx: &mut Context,
  asm: &mut String,
) -> CompileResult<()> {
  let (first, second) = match relation {
    RelOp::Ne => (lhs, rhs),
    _ => (rhs, lhs),
  };
  let ordered = !matches!(relation, RelOp::Eq | RelOp::Ne);
  for operand in [first, second] {
    emit_expr(operand, ctx, asm)?;
    if ordered {
      op(asm, SIGN_BIAS);
    }
  }

  let compare = match relation {
    RelOp::Gt => "SWP2 GTH2",
    RelOp::Lt => "GTH2",
    RelOp::Ge => "GTH2 LIT #01 XOR",
    RelOp::Le => "SWP2 GTH2 LIT #01 XOR",
    RelOp::Eq => "EQU2",
    RelOp::Ne => "EQU2 LIT #01 XOR",
  };
  op(asm, compare);
  Ok(())
}
