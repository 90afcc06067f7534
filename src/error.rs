//! Error related data structures.

use std::fmt::{self, Display, Formatter};

/// Top level enum for error handling within the core.
///
/// Init errors abort machine construction (no partial state escapes);
/// read/write and opcode errors are reported through the host error
/// callback and are recoverable; state-load errors leave the target
/// machine unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The cartridge type byte at 0x0147 is not one of the supported
    /// MBC kinds.
    InitCartridgeUnsupported(u8),

    /// The ROM size is not a supported power-of-two between 32 KiB and
    /// 8 MiB, or does not match the size byte at 0x0148.
    RomSize,

    /// The header checksum at 0x014D does not match the computed value.
    InitInvalidChecksum,

    /// A non-existent primary opcode was fetched. CB-prefixed opcodes
    /// cover all 256 of their second byte, so this can never be raised
    /// from the CB table.
    InvalidOpcode(u8),

    /// A read from an address region with no defined behavior.
    InvalidRead(u16),

    /// A write to an address region with no defined behavior.
    InvalidWrite(u16),

    /// A parameter passed in from the host did not meet a documented
    /// precondition (e.g. an out-of-range breakpoint index).
    InvalidParameter(String),

    StateMagicMismatch,
    StateVersionMismatch,
    StateEndianMismatch,
    StatePointerWidthMismatch,
    StateSramSizeMismatch,
    StateFingerprintMismatch,
    StateSizeMismatch,

    /// The atomic tmp-then-rename save sequence failed on the host side.
    SaveWriteFailed(String),

    CustomError(String),
}

impl Error {
    pub fn description(&self) -> String {
        match self {
            Error::InitCartridgeUnsupported(kind) => {
                format!("Unsupported cartridge type 0x{:02x}", kind)
            }
            Error::RomSize => String::from("Invalid ROM size"),
            Error::InitInvalidChecksum => String::from("Invalid header checksum"),
            Error::InvalidOpcode(opcode) => format!("Invalid opcode 0x{:02x}", opcode),
            Error::InvalidRead(addr) => format!("Invalid read from 0x{:04x}", addr),
            Error::InvalidWrite(addr) => format!("Invalid write to 0x{:04x}", addr),
            Error::InvalidParameter(message) => message.clone(),
            Error::StateMagicMismatch => String::from("State magic mismatch"),
            Error::StateVersionMismatch => String::from("State version mismatch"),
            Error::StateEndianMismatch => String::from("State endianness mismatch"),
            Error::StatePointerWidthMismatch => String::from("State pointer width mismatch"),
            Error::StateSramSizeMismatch => String::from("State SRAM size mismatch"),
            Error::StateFingerprintMismatch => String::from("State ROM fingerprint mismatch"),
            Error::StateSizeMismatch => String::from("State buffer size mismatch"),
            Error::SaveWriteFailed(message) => format!("Save write failed: {}", message),
            Error::CustomError(message) => message.clone(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::SaveWriteFailed(value.to_string())
    }
}
