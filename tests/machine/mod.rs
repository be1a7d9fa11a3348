//! Reference model of the AVC stack machine, used to execute emitted
//! programs in tests.
//!
//! The working stack holds bytes. A 16-bit value is pushed low byte first,
//! so its high byte is on top, and `LIT2 #hh #ll` pushes `0xhhll`. Binary
//! operators take the second item as the left operand. Memory is big-endian.
//! `ADC`/`SBC` follow the 6502 carry convention: `CLC ADC` adds, `SEC SBC`
//! subtracts without borrow. Jump targets are instruction indices.

use std::collections::HashMap;

const CONSOLE: u16 = 0xff09;
const RANDOM: u16 = 0xff02;
const HALT: u16 = 0xff0f;
const STEP_LIMIT: usize = 1_000_000;

/// Byte returned by every read of the random source.
pub const RANDOM_BYTE: u8 = 0x2a;

#[derive(Debug, Clone)]
enum Instr {
  /// Bytes in push order.
  Lit(Vec<u8>),
  /// `LIT2 .absc(NAME)`.
  Address(String),
  Op {
    name: String,
    short: bool,
    keep: bool,
    ret: bool,
  },
  /// A bare `#xx` data byte. Running into one is an error.
  Data(u8),
}

/// What a program left behind when it halted.
#[derive(Debug)]
pub struct Finished {
  pub output: String,
  pub stack: Vec<u8>,
}

pub struct Machine {
  program: Vec<Instr>,
  labels: HashMap<String, usize>,
  stack: Vec<u8>,
  returns: Vec<usize>,
  memory: Vec<u8>,
  carry: bool,
  output: Vec<u8>,
  pc: usize,
  halted: bool,
}

fn parse_byte(token: &str) -> Result<u8, String> {
  if let Some(hex) = token.strip_prefix('#') {
    return u8::from_str_radix(hex, 16).map_err(|err| format!("bad byte {token}: {err}"));
  }
  if let Some(c) = token.strip_prefix('\'') {
    let mut chars = c.chars();
    if let (Some(c), None) = (chars.next(), chars.next())
      && c.is_ascii()
    {
      return Ok(c as u8);
    }
  }
  Err(format!("expected a byte, got {token}"))
}

fn directive<'a>(token: &'a str, names: &[&str]) -> Option<&'a str> {
  names.iter().find_map(|name| {
    token
      .strip_prefix(name)
      .and_then(|rest| rest.strip_prefix('('))
      .and_then(|rest| rest.strip_suffix(')'))
  })
}

impl Machine {
  pub fn load(asm: &str) -> Result<Self, String> {
    let mut program = Vec::new();
    let mut labels = HashMap::new();
    let mut tokens = asm.split_whitespace();

    while let Some(token) = tokens.next() {
      if let Some(name) = directive(token, &[".lbl", ".label"]) {
        if labels.insert(name.to_string(), program.len()).is_some() {
          return Err(format!("label {name} placed twice"));
        }
        continue;
      }
      let mut operand = || tokens.next().ok_or(format!("{token} needs an operand"));
      let instr = match token {
        "LIT" => Instr::Lit(vec![parse_byte(operand()?)?]),
        "LIT2" => {
          let first = operand()?;
          match directive(first, &[".absc"]) {
            Some(name) => Instr::Address(name.to_string()),
            None => {
              let hi = parse_byte(first)?;
              let lo = parse_byte(operand()?)?;
              Instr::Lit(vec![lo, hi])
            }
          }
        }
        data if data.starts_with('#') => Instr::Data(parse_byte(data)?),
        mnemonic if mnemonic.len() >= 3 && mnemonic.is_char_boundary(3) => {
          let (name, flags) = mnemonic.split_at(3);
          if !flags.chars().all(|flag| matches!(flag, '2' | 'k' | 'r')) {
            return Err(format!("unknown instruction {mnemonic}"));
          }
          Instr::Op {
            name: name.to_string(),
            short: flags.contains('2'),
            keep: flags.contains('k'),
            ret: flags.contains('r'),
          }
        }
        other => return Err(format!("unknown token {other}")),
      };
      program.push(instr);
    }

    Ok(Self {
      program,
      labels,
      stack: Vec::new(),
      returns: Vec::new(),
      memory: vec![0; 0x10000],
      carry: false,
      output: Vec::new(),
      pc: 0,
      halted: false,
    })
  }

  /// Run from the first instruction until the program writes the halt port.
  pub fn run(mut self) -> Result<Finished, String> {
    for _ in 0..STEP_LIMIT {
      if self.halted {
        return Ok(Finished {
          output: String::from_utf8_lossy(&self.output).into_owned(),
          stack: self.stack,
        });
      }
      let instr = self
        .program
        .get(self.pc)
        .cloned()
        .ok_or(format!("ran off the end of the program at {}", self.pc))?;
      self.pc += 1;
      self.step(instr)?;
    }
    Err("step limit reached".to_string())
  }

  fn pop_byte(&mut self) -> Result<u8, String> {
    self.stack.pop().ok_or_else(|| "stack underflow".to_string())
  }

  fn pop_short(&mut self) -> Result<u16, String> {
    let hi = self.pop_byte()?;
    let lo = self.pop_byte()?;
    Ok(u16::from_be_bytes([hi, lo]))
  }

  fn push_short(&mut self, value: u16) {
    let [hi, lo] = value.to_be_bytes();
    self.stack.push(lo);
    self.stack.push(hi);
  }

  fn pop(&mut self, short: bool) -> Result<u16, String> {
    if short {
      self.pop_short()
    } else {
      self.pop_byte().map(u16::from)
    }
  }

  fn push(&mut self, short: bool, value: u16) {
    if short {
      self.push_short(value);
    } else {
      self.stack.push(value as u8);
    }
  }

  fn jump(&mut self, target: u16) -> Result<(), String> {
    let target = usize::from(target);
    if target > self.program.len() {
      return Err(format!("jump outside the program to {target}"));
    }
    self.pc = target;
    Ok(())
  }

  fn load_memory(&self, addr: u16, short: bool) -> u16 {
    let read = |addr: u16| match addr {
      RANDOM => RANDOM_BYTE,
      _ => self.memory[usize::from(addr)],
    };
    if short {
      u16::from_be_bytes([read(addr), read(addr.wrapping_add(1))])
    } else {
      u16::from(read(addr))
    }
  }

  fn store_memory(&mut self, addr: u16, value: u16, short: bool) {
    let bytes = if short {
      value.to_be_bytes().to_vec()
    } else {
      vec![value as u8]
    };
    for (offset, byte) in bytes.into_iter().enumerate() {
      let addr = addr.wrapping_add(offset as u16);
      match addr {
        CONSOLE => self.output.push(byte),
        HALT => self.halted = true,
        _ => self.memory[usize::from(addr)] = byte,
      }
    }
  }

  fn restore(&mut self, saved: &Option<Vec<u8>>) {
    if let Some(saved) = saved {
      self.stack.clone_from(saved);
    }
  }

  fn step(&mut self, instr: Instr) -> Result<(), String> {
    let (name, short, keep, ret) = match instr {
      Instr::Lit(bytes) => {
        self.stack.extend(bytes);
        return Ok(());
      }
      Instr::Address(name) => {
        let target = *self
          .labels
          .get(&name)
          .ok_or(format!("label {name} is never placed"))?;
        self.push_short(target as u16);
        return Ok(());
      }
      Instr::Data(byte) => return Err(format!("executed data byte #{byte:02x}")),
      Instr::Op {
        name,
        short,
        keep,
        ret,
      } => (name, short, keep, ret),
    };

    let mask: u32 = if short { 0xffff } else { 0xff };
    // Operands are popped first; keep mode puts them back before the result.
    let saved = keep.then(|| self.stack.clone());

    match name.as_str() {
      "SEC" => self.carry = true,
      "CLC" => self.carry = false,
      "POP" => {
        self.pop(short)?;
        self.restore(&saved);
      }
      "DUP" => {
        let a = self.pop(short)?;
        self.restore(&saved);
        self.push(short, a);
        self.push(short, a);
      }
      "SWP" => {
        let b = self.pop(short)?;
        let a = self.pop(short)?;
        self.restore(&saved);
        self.push(short, b);
        self.push(short, a);
      }
      "OVR" => {
        let b = self.pop(short)?;
        let a = self.pop(short)?;
        self.restore(&saved);
        self.push(short, a);
        self.push(short, b);
        self.push(short, a);
      }
      "ROT" => {
        let c = self.pop(short)?;
        let b = self.pop(short)?;
        let a = self.pop(short)?;
        self.restore(&saved);
        self.push(short, b);
        self.push(short, c);
        self.push(short, a);
      }
      "ADC" | "SBC" | "MUL" | "XOR" | "IOR" | "AND" => {
        let b = u32::from(self.pop(short)?);
        let a = u32::from(self.pop(short)?);
        self.restore(&saved);
        let result = match name.as_str() {
          "ADC" => {
            let sum = a + b + u32::from(self.carry);
            self.carry = sum > mask;
            sum
          }
          "SBC" => {
            let borrow = u32::from(!self.carry);
            self.carry = a >= b + borrow;
            a.wrapping_sub(b + borrow)
          }
          "MUL" => a.wrapping_mul(b),
          "XOR" => a ^ b,
          "IOR" => a | b,
          _ => a & b,
        };
        self.push(short, (result & mask) as u16);
      }
      "DVM" => {
        let b = self.pop(short)?;
        let a = self.pop(short)?;
        self.restore(&saved);
        if b == 0 {
          return Err("division by zero".to_string());
        }
        self.push(short, a / b);
        self.push(short, a % b);
      }
      "SFT" => {
        let shift = u32::from(self.pop_byte()?);
        let a = u32::from(self.pop(short)?);
        self.restore(&saved);
        let result = ((a >> (shift & 0x0f)) << (shift >> 4)) & mask;
        self.push(short, result as u16);
      }
      "EQU" | "GTH" => {
        let b = self.pop(short)?;
        let a = self.pop(short)?;
        self.restore(&saved);
        let holds = if name == "EQU" { a == b } else { a > b };
        self.stack.push(u8::from(holds));
      }
      "LDA" => {
        let addr = self.pop_short()?;
        self.restore(&saved);
        let value = self.load_memory(addr, short);
        self.push(short, value);
      }
      "STA" => {
        let addr = self.pop_short()?;
        let value = self.pop(short)?;
        self.restore(&saved);
        self.store_memory(addr, value, short);
      }
      "JMP" if ret => {
        let target = self.returns.pop().ok_or("return stack underflow")?;
        self.pc = target;
      }
      "JMP" => {
        let target = self.pop_short()?;
        self.restore(&saved);
        self.jump(target)?;
      }
      "JSR" => {
        let target = self.pop_short()?;
        self.restore(&saved);
        self.returns.push(self.pc);
        self.jump(target)?;
      }
      "JNZ" => {
        let target = self.pop_short()?;
        let cond = self.pop_byte()?;
        self.restore(&saved);
        if cond != 0 {
          self.jump(target)?;
        }
      }
      other => return Err(format!("unsupported instruction {other}")),
    }
    Ok(())
  }
}

/// Compile `source`, run it, and return what it printed. The stack must be
/// empty when the program halts.
pub fn run_basic(source: &str) -> String {
  let asm = avcbasic::generate_assembly(source).expect("program should compile");
  let finished = Machine::load(&asm)
    .and_then(Machine::run)
    .unwrap_or_else(|err| panic!("{err}\n{asm}"));
  assert!(
    finished.stack.is_empty(),
    "stack left with {:?}\n{asm}",
    finished.stack
  );
  finished.output
}

/// Source text for a literal, including the one value that cannot be
/// written as a single negated number.
pub fn literal(value: i16) -> String {
  match value {
    i16::MIN => "-32767 - 1".to_string(),
    _ if value < 0 => format!("-{}", value.unsigned_abs()),
    _ => value.to_string(),
  }
}
