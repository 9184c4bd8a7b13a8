use log::{debug, trace};

use crate::error::DecodeError;
use crate::instruction::{Address, DecodedInstruction, Field, Operand};
use crate::table::{self, OpcodeEntry, SizeClass, DIRECT_ADDRESS};

pub fn disassemble(bytes: &[u8]) -> Result<String, DecodeError> {
  let mut lines = vec!["bits 16".to_string()];
  for decoded in instructions(bytes) {
    let (_, instruction) = decoded?;
    lines.push(instruction.to_string());
  }
  lines.push("".to_string());
  Ok(lines.join("\n"))
}

/// Decodes `bytes` from offset 0, yielding each instruction with its offset.
/// Stops for good after the first error.
pub fn instructions(bytes: &[u8]) -> Instructions<'_> {
  Instructions { bytes, offset: 0, failed: false }
}

pub struct Instructions<'a> {
  bytes: &'a [u8],
  offset: usize,
  failed: bool,
}

impl Iterator for Instructions<'_> {
  type Item = Result<(usize, DecodedInstruction), DecodeError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.failed {
      return None;
    }
    let offset = self.offset;
    let byte = *self.bytes.get(offset)?;
    let decoded = table::match_opcode(byte)
      .ok_or(DecodeError::UnknownOpcode { byte, offset })
      .and_then(|entry| decode(entry, self.bytes, offset));
    match decoded {
      Ok((instruction, next)) => {
        self.offset = next;
        Some(Ok((offset, instruction)))
      }
      Err(err) => {
        self.failed = true;
        Some(Err(err))
      }
    }
  }
}

/// Decodes the instruction starting at `offset`, returning it together with the
/// offset of the byte right after it.
pub fn decode(
  entry: &OpcodeEntry,
  bytes: &[u8],
  offset: usize,
) -> Result<(DecodedInstruction, usize), DecodeError> {
  let mut cursor = Cursor::new(bytes, offset);
  let b1 = cursor.next_u8()?;
  let mut instruction = DecodedInstruction {
    opcode: b1,
    mnemonic: entry.mnemonic,
    direction: b1 & entry.d_mask != 0,
    wide: b1 & entry.w_mask != 0,
    reg: None,
    rm: None,
    immediate: None,
  };
  match entry.size {
    SizeClass::OneByte => decode_one_byte(entry, b1, &mut cursor, &mut instruction)?,
    SizeClass::ModRegRm => decode_mod_reg_rm(entry, &mut cursor, &mut instruction)?,
  }
  debug!(
    "{offset:#06x}: {} ({} bytes): {instruction}",
    entry.description,
    cursor.pos - offset
  );
  Ok((instruction, cursor.pos))
}

// register code sits in the low bits of the opcode byte, no shift needed
fn decode_one_byte(
  entry: &OpcodeEntry,
  b1: u8,
  cursor: &mut Cursor,
  instruction: &mut DecodedInstruction,
) -> Result<(), DecodeError> {
  if entry.reg_mask != 0 {
    instruction.reg = Some(register_field(b1 & entry.reg_mask, instruction.wide)?);
  }
  if entry.data {
    instruction.immediate = Some(immediate(cursor, instruction.wide)?);
  }
  Ok(())
}

fn decode_mod_reg_rm(
  entry: &OpcodeEntry,
  cursor: &mut Cursor,
  instruction: &mut DecodedInstruction,
) -> Result<(), DecodeError> {
  let b2 = cursor.next_u8()?;
  let wide = instruction.wide;
  let r#mod = b2 & entry.mod_mask;
  let reg = (b2 & entry.reg_mask) >> 3;
  let rm = b2 & entry.rm_mask;
  trace!("mod {:02b} reg {reg:03b} rm {rm:03b}", r#mod >> 6);

  if entry.reg_mask != 0 {
    instruction.reg = Some(register_field(reg, wide)?);
  }

  let operand = match r#mod {
    0b_00_000_000 if rm == DIRECT_ADDRESS => Operand::Memory(Address::Direct(cursor.next_u16()?)),
    0b_00_000_000 => Operand::Memory(Address::Expr(table::effective_address(rm, false)?.expr)),
    0b_01_000_000 => {
      let expr = table::effective_address(rm, true)?.expr;
      let disp = i16::from(cursor.next_u8()? as i8);
      Operand::Memory(Address::Displaced(expr, disp))
    }
    0b_10_000_000 => {
      let expr = table::effective_address(rm, true)?.expr;
      let disp = cursor.next_u16()? as i16;
      Operand::Memory(Address::Displaced(expr, disp))
    }
    0b_11_000_000 => Operand::Register(table::register(rm, wide)?),
    _ => return Err(DecodeError::UnmappedCode { table: "mod", code: r#mod }),
  };
  instruction.rm = Some(Field { code: rm, operand });

  if entry.data {
    instruction.immediate = Some(immediate(cursor, wide)?);
  }
  Ok(())
}

fn register_field(code: u8, wide: bool) -> Result<Field, DecodeError> {
  let name = table::register(code, wide)?;
  Ok(Field { code, operand: Operand::Register(name) })
}

// immediates are signed at their encoded width
fn immediate(cursor: &mut Cursor, wide: bool) -> Result<i16, DecodeError> {
  if wide {
    Ok(cursor.next_u16()? as i16)
  } else {
    Ok(i16::from(cursor.next_u8()? as i8))
  }
}

/// Read position within one instruction. Only moves forward.
struct Cursor<'a> {
  bytes: &'a [u8],
  start: usize,
  pos: usize,
}

impl<'a> Cursor<'a> {
  fn new(bytes: &'a [u8], start: usize) -> Self {
    Cursor { bytes, start, pos: start }
  }

  fn next_u8(&mut self) -> Result<u8, DecodeError> {
    let byte = *self.bytes.get(self.pos).ok_or(DecodeError::TruncatedStream {
      start: self.start,
      offset: self.pos,
      len: self.bytes.len(),
    })?;
    self.pos += 1;
    Ok(byte)
  }

  fn next_u16(&mut self) -> Result<u16, DecodeError> {
    let lo = self.next_u8()?;
    let hi = self.next_u8()?;
    Ok(u16::from(hi) << 8 | u16::from(lo))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::table::{OPCODES, REGISTERS};
  use indoc::indoc as asm;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_listing_37() {
    assert_eq!(
      disassemble(&[0b100010_0_1, 0b11_011_001]).unwrap(),
      asm! {"
        bits 16
        mov cx, bx
      "}
    );
  }

  #[test]
  fn test_listing_38() {
    assert_eq!(
      disassemble(&[
        0b_10001001,
        0b_11011001,
        0b_10001000,
        0b_11100101,
        0b_10001001,
        0b_11011010,
        0b_10001001,
        0b_11011110,
        0b_10001001,
        0b_11111011,
        0b_10001000,
        0b_11001000,
        0b_10001000,
        0b_11101101,
        0b_10001001,
        0b_11000011,
        0b_10001001,
        0b_11110011,
        0b_10001001,
        0b_11111100,
        0b_10001001,
        0b_11000101,
      ])
      .unwrap(),
      asm! {"
        bits 16
        mov cx, bx
        mov ch, ah
        mov dx, bx
        mov si, bx
        mov bx, di
        mov al, cl
        mov ch, ch
        mov bx, ax
        mov bx, si
        mov sp, di
        mov bp, ax
      "}
    );
  }

  #[test]
  fn test_listing_39() {
    assert_eq!(
      disassemble(&[
        0x89, 0xDE, //
        0x88, 0xC6, //
        0xB1, 0x0C, //
        0xB5, 0xF4, //
        0xB9, 0x0C, 0x00, //
        0xB9, 0xF4, 0xFF, //
        0xBA, 0x6C, 0x0F, //
        0xBA, 0x94, 0xF0, //
        0x8A, 0x00, //
        0x8B, 0x1B, //
        0x8B, 0x56, 0x00, //
        0x8A, 0x60, 0x04, //
        0x8A, 0x80, 0x87, 0x13, //
        0x89, 0x09, //
        0x88, 0x0A, //
        0x88, 0x6E, 0x00, //
      ])
      .unwrap(),
      asm! {"
        bits 16
        mov si, bx
        mov dh, al
        mov cl, 12
        mov ch, -12
        mov cx, 12
        mov cx, -12
        mov dx, 3948
        mov dx, -3948
        mov al, [bx + si]
        mov bx, [bp + di]
        mov dx, [bp + 0]
        mov ah, [bx + si + 4]
        mov al, [bx + si + 4999]
        mov [bx + di], cx
        mov [bp + si], cl
        mov [bp + 0], ch
      "}
    );
  }

  #[test]
  fn test_signed_displacements_direct_addresses_and_immediates_to_memory() {
    assert_eq!(
      disassemble(&[
        0x8B, 0x41, 0xDB, //
        0x89, 0x8C, 0xD4, 0xFE, //
        0x8B, 0x57, 0xE0, //
        0x8B, 0x46, 0xFE, //
        0x8B, 0x86, 0x02, 0x00, //
        0x8B, 0x87, 0x00, 0x80, //
        0xC6, 0x03, 0x07, //
        0xC7, 0x85, 0x85, 0x03, 0x5B, 0x01, //
        0xC6, 0xC1, 0x07, //
        0x8B, 0x2E, 0x05, 0x00, //
        0x8B, 0x1E, 0x82, 0x0D, //
        0x8B, 0x06, 0x34, 0x12, //
        0xB8, 0x00, 0x00, //
      ])
      .unwrap(),
      asm! {"
        bits 16
        mov ax, [bx + di - 37]
        mov [si - 300], cx
        mov dx, [bx - 32]
        mov ax, [bp - 2]
        mov ax, [bp + 2]
        mov ax, [bx - 32768]
        mov [bp + di], byte 7
        mov [di + 901], word 347
        mov cl, 7
        mov bp, [5]
        mov bx, [3458]
        mov ax, [4660]
        mov ax, 0
      "}
    );
  }

  #[test]
  fn test_decode_returns_offset_after_instruction() {
    let bytes = [0x89, 0xD9, 0x8B, 0x86, 0x02, 0x00, 0xB1, 0x0C];
    let (inst, next) = decode(&OPCODES[0], &bytes, 2).unwrap();
    assert_eq!(next, 6);
    assert_eq!(inst.rm.unwrap().operand, Operand::Memory(Address::Displaced("bp", 2)));
    let (inst, next) = decode(&OPCODES[2], &bytes, 6).unwrap();
    assert_eq!(next, 8);
    assert_eq!(inst.immediate, Some(12));
    assert_eq!(inst.rm, None);
    assert_eq!(inst.reg, Some(Field { code: 0b_001, operand: Operand::Register("cl") }));
  }

  #[test]
  fn test_instruction_offsets() {
    let bytes = [0x89, 0xD9, 0xB9, 0x0C, 0x00, 0x8A, 0x60, 0x04, 0x88, 0xC6];
    let offsets: Vec<_> = instructions(&bytes)
      .map(|decoded| decoded.unwrap().0)
      .collect();
    assert_eq!(offsets, vec![0, 2, 5, 8]);
  }

  #[test]
  fn test_unknown_opcode() {
    let err = disassemble(&[0xFF]).unwrap_err();
    assert_eq!(err, DecodeError::UnknownOpcode { byte: 0xFF, offset: 0 });
    assert!(err.to_string().contains("11111111"));
  }

  #[test]
  fn test_unknown_opcode_stops_the_stream() {
    let mut decoded = instructions(&[0x89, 0xD9, 0xFF, 0x89, 0xD9]);
    assert_eq!(decoded.next().unwrap().unwrap().1.to_string(), "mov cx, bx");
    assert_eq!(
      decoded.next().unwrap(),
      Err(DecodeError::UnknownOpcode { byte: 0xFF, offset: 2 })
    );
    assert!(decoded.next().is_none());
  }

  #[test]
  fn test_truncated_stream() {
    let cases: [(&[u8], DecodeError); 5] = [
      (&[0x89], DecodeError::TruncatedStream { start: 0, offset: 1, len: 1 }),
      (&[0x8B, 0x46], DecodeError::TruncatedStream { start: 0, offset: 2, len: 2 }),
      (&[0x8B, 0x06, 0x34], DecodeError::TruncatedStream { start: 0, offset: 3, len: 3 }),
      (&[0x89, 0xD9, 0xB9, 0x0C], DecodeError::TruncatedStream { start: 2, offset: 4, len: 4 }),
      (
        &[0xC7, 0x85, 0x85, 0x03, 0x5B],
        DecodeError::TruncatedStream { start: 0, offset: 5, len: 5 },
      ),
    ];
    for (bytes, expected) in cases {
      assert_eq!(disassemble(bytes), Err(expected));
    }
  }

  #[test]
  fn test_empty_stream() {
    assert_eq!(disassemble(&[]).unwrap(), "bits 16\n");
  }

  #[test]
  fn test_decoding_is_repeatable() {
    let bytes = [0x89, 0xDE, 0xB5, 0xF4, 0x8B, 0x41, 0xDB, 0xC6, 0x03, 0x07];
    assert_eq!(disassemble(&bytes), disassemble(&bytes));
  }

  fn encode(inst: &DecodedInstruction) -> [u8; 2] {
    let names = &REGISTERS[usize::from(inst.wide)];
    let code = |field: Option<Field>| match field.map(|field| field.operand) {
      Some(Operand::Register(name)) => names.iter().position(|n| *n == name).unwrap() as u8,
      other => panic!("expected a register, got {other:?}"),
    };
    [
      0b_100010_0_0 | u8::from(inst.direction) << 1 | u8::from(inst.wide),
      0b_11_000_000 | code(inst.reg) << 3 | code(inst.rm),
    ]
  }

  #[test]
  fn test_register_mode_round_trips() {
    for b1 in 0b_100010_0_0..=0b_100010_1_1 {
      for fields in 0..=0b_111_111 {
        let bytes = [b1, 0b_11_000_000 | fields];
        let (inst, next) = decode(&OPCODES[0], &bytes, 0).unwrap();
        assert_eq!(next, 2);
        assert_eq!(encode(&inst), bytes);
        let (again, _) = decode(&OPCODES[0], &encode(&inst), 0).unwrap();
        assert_eq!(again.to_string(), inst.to_string());
      }
    }
  }
}
