use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Address {
  Direct(u16),
  Expr(&'static str),
  Displaced(&'static str, i16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
  Register(&'static str),
  Memory(Address),
}

/// A REG or R/M field: the raw 3-bit code and what it resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
  pub code: u8,
  pub operand: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
  pub opcode: u8,
  pub mnemonic: &'static str,
  pub direction: bool,
  pub wide: bool,
  pub reg: Option<Field>,
  pub rm: Option<Field>,
  pub immediate: Option<i16>,
}

impl fmt::Display for Address {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match *self {
      Address::Direct(addr) => write!(f, "[{addr}]"),
      Address::Expr(expr) => write!(f, "[{expr}]"),
      Address::Displaced(expr, disp) if disp < 0 => {
        write!(f, "[{expr} - {}]", disp.unsigned_abs())
      }
      Address::Displaced(expr, disp) => write!(f, "[{expr} + {disp}]"),
    }
  }
}

impl fmt::Display for Operand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Operand::Register(name) => f.write_str(name),
      Operand::Memory(address) => write!(f, "{address}"),
    }
  }
}

impl fmt::Display for DecodedInstruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mnemonic = self.mnemonic;
    let reg = self.reg.map(|field| field.operand);
    let rm = self.rm.map(|field| field.operand);
    match (reg, rm, self.immediate) {
      (_, Some(dst @ Operand::Memory(_)), Some(imm)) => {
        let size = if self.wide { "word" } else { "byte" };
        write!(f, "{mnemonic} {dst}, {size} {imm}")
      }
      (_, Some(dst), Some(imm)) | (Some(dst), None, Some(imm)) => {
        write!(f, "{mnemonic} {dst}, {imm}")
      }
      (Some(reg), Some(rm), None) if self.direction => write!(f, "{mnemonic} {reg}, {rm}"),
      (Some(reg), Some(rm), None) => write!(f, "{mnemonic} {rm}, {reg}"),
      // the decoder always fills the operands its entry declares
      _ => f.write_str(mnemonic),
    }
  }
}
