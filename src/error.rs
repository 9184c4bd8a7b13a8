use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("byte {byte:08b} at offset {offset} does not map to a known 8086 instruction")]
  UnknownOpcode { byte: u8, offset: usize },

  #[error("instruction at offset {start} needs byte {offset}, stream is {len} bytes long")]
  TruncatedStream {
    start: usize,
    offset: usize,
    len: usize,
  },

  /// A code reached a lookup table with no entry for it. Always a decoder defect.
  #[error("internal error: no {table} entry for code {code:08b}")]
  UnmappedCode { table: &'static str, code: u8 },
}
