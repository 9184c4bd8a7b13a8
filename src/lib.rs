pub mod decode;
pub mod error;
pub mod instruction;
pub mod table;

pub use decode::{decode, disassemble, instructions};
pub use error::DecodeError;
pub use instruction::DecodedInstruction;
