use crate::error::DecodeError;

/// Selects which decode path an opcode entry goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
  /// Operand register and width live in the opcode byte itself; an immediate follows.
  OneByte,
  /// A MOD/REG/R/M byte follows the opcode byte, then any displacement.
  ModRegRm,
}

/// One row of the opcode table. Masks are zero when the field is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
  pub description: &'static str,
  pub mnemonic: &'static str,
  pub size: SizeClass,
  pub opcode: u8,
  pub opcode_mask: u8,
  pub d_mask: u8,
  pub w_mask: u8,
  pub mod_mask: u8,
  pub reg_mask: u8,
  pub rm_mask: u8,
  /// An immediate of the operand width follows the operand bytes.
  pub data: bool,
}

// first match wins: an entry must come before any entry whose pattern also
// matches its bytes with a narrower mask
pub static OPCODES: [OpcodeEntry; 3] = [
  OpcodeEntry {
    description: "Register/memory to/from register/memory",
    mnemonic: "mov",
    size: SizeClass::ModRegRm,
    opcode: 0b_100010_0_0,
    opcode_mask: 0b_111111_0_0,
    d_mask: 0b_000000_1_0,
    w_mask: 0b_000000_0_1,
    mod_mask: 0b_11_000_000,
    reg_mask: 0b_00_111_000,
    rm_mask: 0b_00_000_111,
    data: false,
  },
  OpcodeEntry {
    description: "Immediate to register/memory",
    mnemonic: "mov",
    size: SizeClass::ModRegRm,
    opcode: 0b_1100011_0,
    opcode_mask: 0b_1111111_0,
    d_mask: 0,
    w_mask: 0b_0000000_1,
    mod_mask: 0b_11_000_000,
    reg_mask: 0,
    rm_mask: 0b_00_000_111,
    data: true,
  },
  OpcodeEntry {
    description: "Immediate to register",
    mnemonic: "mov",
    size: SizeClass::OneByte,
    opcode: 0b_1011_0_000,
    opcode_mask: 0b_1111_0_000,
    d_mask: 0,
    w_mask: 0b_0000_1_000,
    mod_mask: 0,
    reg_mask: 0b_0000_0_111,
    rm_mask: 0,
    data: true,
  },
];

pub fn match_opcode(byte: u8) -> Option<&'static OpcodeEntry> {
  OPCODES
    .iter()
    .find(|entry| byte & entry.opcode_mask == entry.opcode)
}

pub static REGISTERS: [[&str; 8]; 2] = [
  ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"],
  ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"],
];

pub fn register(code: u8, wide: bool) -> Result<&'static str, DecodeError> {
  REGISTERS[usize::from(wide)]
    .get(usize::from(code))
    .copied()
    .ok_or(DecodeError::UnmappedCode { table: "register", code })
}

/// R/M code that means a 16-bit direct address when MOD is 00.
pub const DIRECT_ADDRESS: u8 = 0b_110;

/// Base and index are 16-bit register codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveAddress {
  pub base: Option<u8>,
  pub index: Option<u8>,
  pub expr: &'static str,
}

const BX: u8 = 0b_011;
const BP: u8 = 0b_101;
const SI: u8 = 0b_110;
const DI: u8 = 0b_111;

pub static EFFECTIVE_ADDRESSES: [EffectiveAddress; 8] = [
  EffectiveAddress { base: Some(BX), index: Some(SI), expr: "bx + si" },
  EffectiveAddress { base: Some(BX), index: Some(DI), expr: "bx + di" },
  EffectiveAddress { base: Some(BP), index: Some(SI), expr: "bp + si" },
  EffectiveAddress { base: Some(BP), index: Some(DI), expr: "bp + di" },
  EffectiveAddress { base: None, index: Some(SI), expr: "si" },
  EffectiveAddress { base: None, index: Some(DI), expr: "di" },
  // only reachable with a displacement; MOD 00 means a direct address
  EffectiveAddress { base: Some(BP), index: None, expr: "bp" },
  EffectiveAddress { base: Some(BX), index: None, expr: "bx" },
];

pub fn effective_address(
  rm: u8,
  displaced: bool,
) -> Result<&'static EffectiveAddress, DecodeError> {
  if rm == DIRECT_ADDRESS && !displaced {
    return Err(DecodeError::UnmappedCode { table: "effective address", code: rm });
  }
  EFFECTIVE_ADDRESSES
    .get(usize::from(rm))
    .ok_or(DecodeError::UnmappedCode { table: "effective address", code: rm })
}
