//! Compile-time symbol state threaded through folding and emission.
//!
//! One `Context` belongs to one compilation. It records where each variable
//! lives, which labels exist, and hands out synthetic label names from
//! per-construct counters so generated branch targets never collide.

use std::collections::{BTreeMap, BTreeSet};

use snafu::ensure;

use crate::error::{CompileResult, DuplicateLabelSnafu};

/// Variables are allocated downward from here, one 16-bit cell each.
pub const VARIABLE_BASE: u16 = 0xff00;

/// Prefix of the assembler name of a user label.
pub const USER_LABEL_PREFIX: &str = "AVCBASIC_";

/// Prefix reserved for labels the compiler generates.
pub const SYNTHETIC_LABEL_PREFIX: &str = "AVCBINTERNAL_";

/// Assembler name of the user label `label`.
pub fn user_label(label: char) -> String {
  format!("{USER_LABEL_PREFIX}{label}")
}

/// Labels used by one multiply/divide site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArithmeticLabels {
  pub lhs_sign: String,
  pub rhs_sign: String,
  pub result_sign: String,
}

/// Labels used by one printed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintLabels {
  pub digits: String,
  pub output: String,
}

#[derive(Debug, Default, Clone)]
struct LabelCounters {
  arithmetic: usize,
  print: usize,
  branch: usize,
  jump_over: usize,
}

#[derive(Debug, Clone)]
pub struct Context {
  variables: BTreeMap<char, u16>,
  next_address: u16,
  declared_labels: BTreeSet<char>,
  placed_labels: BTreeSet<char>,
  counters: LabelCounters,
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl Context {
  pub fn new() -> Self {
    Self {
      variables: BTreeMap::new(),
      next_address: VARIABLE_BASE,
      declared_labels: BTreeSet::new(),
      placed_labels: BTreeSet::new(),
      counters: LabelCounters::default(),
    }
  }

  /// Forget everything so the context can serve an unrelated compilation.
  pub fn reset(&mut self) {
    *self = Self::new();
  }

  /// Address of a variable that has already been assigned.
  pub fn address_of(&self, id: char) -> Option<u16> {
    self.variables.get(&id).copied()
  }

  /// Address of `id`, allocating the next free cell on first use.
  pub fn allocate(&mut self, id: char) -> u16 {
    if let Some(addr) = self.variables.get(&id) {
      return *addr;
    }
    self.next_address = self.next_address.wrapping_sub(2);
    self.variables.insert(id, self.next_address);
    self.next_address
  }

  /// Register a label declaration. A letter can be declared once.
  pub fn declare_label(&mut self, label: char) -> CompileResult<()> {
    ensure!(
      self.declared_labels.insert(label),
      DuplicateLabelSnafu { label }
    );
    Ok(())
  }

  pub fn is_declared(&self, label: char) -> bool {
    self.declared_labels.contains(&label)
  }

  /// Record that the emitter placed `label`; placing it twice is an error.
  pub fn place_label(&mut self, label: char) -> CompileResult<()> {
    ensure!(
      self.placed_labels.insert(label),
      DuplicateLabelSnafu { label }
    );
    self.declared_labels.insert(label);
    Ok(())
  }

  pub fn arithmetic_labels(&mut self) -> ArithmeticLabels {
    let n = self.counters.arithmetic;
    self.counters.arithmetic += 1;
    ArithmeticLabels {
      lhs_sign: format!("{SYNTHETIC_LABEL_PREFIX}SR1_{n}"),
      rhs_sign: format!("{SYNTHETIC_LABEL_PREFIX}SR2_{n}"),
      result_sign: format!("{SYNTHETIC_LABEL_PREFIX}MULT_{n}"),
    }
  }

  pub fn print_labels(&mut self) -> PrintLabels {
    let n = self.counters.print;
    self.counters.print += 1;
    PrintLabels {
      digits: format!("{SYNTHETIC_LABEL_PREFIX}PRINT1_{n}"),
      output: format!("{SYNTHETIC_LABEL_PREFIX}PRINT2_{n}"),
    }
  }

  pub fn branch_label(&mut self) -> String {
    let n = self.counters.branch;
    self.counters.branch += 1;
    format!("{SYNTHETIC_LABEL_PREFIX}IF_{n}")
  }

  pub fn jump_over_label(&mut self) -> String {
    let n = self.counters.jump_over;
    self.counters.jump_over += 1;
    format!("{SYNTHETIC_LABEL_PREFIX}JUMPOVER_{n}")
  }
}
