//! Signal type tags and directions.
//!
//! Channel values cross the driver boundary as raw native-endian bytes tagged
//! with a [`SignalType`]. The helpers here encode a logical bit into any
//! numeric representation and decode any representation back into a bit,
//! so drivers never need a match over types of their own.

use serde::{Deserialize, Serialize};

/// Direction of a channel group.
///
/// `None` is the unset value a configuration tree yields when no direction
/// was given; every driver operation rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    #[default]
    None,
    Input,
    Output,
}

impl SignalDirection {
    /// True for `Input` and `Output`.
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::None)
    }
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::None => "none",
            Self::Input => "input",
            Self::Output => "output",
        };
        write!(f, "{}", label)
    }
}

/// Numeric representation of a materialised channel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    CharString,
    Void,
}

impl SignalType {
    /// Every type tag, in declaration order.
    pub const ALL: [SignalType; 13] = [
        Self::UInt8,
        Self::UInt16,
        Self::UInt32,
        Self::UInt64,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float32,
        Self::Float64,
        Self::Bool,
        Self::CharString,
        Self::Void,
    ];

    /// Size in bytes of one value, `None` for types without a fixed width.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            Self::UInt8 | Self::Int8 | Self::Bool => Some(1),
            Self::UInt16 | Self::Int16 => Some(2),
            Self::UInt32 | Self::Int32 | Self::Float32 => Some(4),
            Self::UInt64 | Self::Int64 | Self::Float64 => Some(8),
            Self::CharString | Self::Void => None,
        }
    }

    /// Encode a logical bit into `dest`.
    ///
    /// `dest` must be exactly [`byte_size`](Self::byte_size) bytes long.
    /// Returns `false` (and leaves `dest` untouched) for types without a
    /// fixed width or a wrongly sized slice.
    pub fn encode_bit(self, bit: bool, dest: &mut [u8]) -> bool {
        if self.byte_size() != Some(dest.len()) {
            return false;
        }
        let v = u8::from(bit);
        match self {
            Self::UInt8 | Self::Bool => dest.copy_from_slice(&[v]),
            Self::Int8 => dest.copy_from_slice(&(v as i8).to_ne_bytes()),
            Self::UInt16 => dest.copy_from_slice(&u16::from(v).to_ne_bytes()),
            Self::Int16 => dest.copy_from_slice(&i16::from(v).to_ne_bytes()),
            Self::UInt32 => dest.copy_from_slice(&u32::from(v).to_ne_bytes()),
            Self::Int32 => dest.copy_from_slice(&i32::from(v).to_ne_bytes()),
            Self::UInt64 => dest.copy_from_slice(&u64::from(v).to_ne_bytes()),
            Self::Int64 => dest.copy_from_slice(&i64::from(v).to_ne_bytes()),
            Self::Float32 => dest.copy_from_slice(&f32::from(v).to_ne_bytes()),
            Self::Float64 => dest.copy_from_slice(&f64::from(v).to_ne_bytes()),
            Self::CharString | Self::Void => return false,
        }
        true
    }

    /// Decode a value as a logical bit: any nonzero value is `true`.
    ///
    /// Returns `None` for types without a fixed width or a wrongly sized slice.
    pub fn decode_bit(self, src: &[u8]) -> Option<bool> {
        if self.byte_size() != Some(src.len()) {
            return None;
        }
        let bit = match self {
            Self::Float32 => f32::from_ne_bytes(src.try_into().ok()?) != 0.0,
            Self::Float64 => f64::from_ne_bytes(src.try_into().ok()?) != 0.0,
            Self::CharString | Self::Void => return None,
            _ => src.iter().any(|&b| b != 0),
        };
        Some(bit)
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::CharString => "char_string",
            Self::Void => "void",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_validity() {
        assert!(!SignalDirection::None.is_valid());
        assert!(SignalDirection::Input.is_valid());
        assert!(SignalDirection::Output.is_valid());
        assert_eq!(SignalDirection::default(), SignalDirection::None);
    }

    #[test]
    fn test_encode_bit_float() {
        let mut buf = [0u8; 8];
        assert!(SignalType::Float64.encode_bit(true, &mut buf));
        assert_eq!(f64::from_ne_bytes(buf), 1.0);

        let mut buf = [0xFFu8; 4];
        assert!(SignalType::Float32.encode_bit(false, &mut buf));
        assert_eq!(f32::from_ne_bytes(buf), 0.0);
    }

    #[test]
    fn test_encode_bit_rejects_wrong_width() {
        let mut buf = [0u8; 3];
        assert!(!SignalType::UInt32.encode_bit(true, &mut buf));
        assert_eq!(buf, [0, 0, 0]);
        assert!(!SignalType::Void.encode_bit(true, &mut []));
    }

    #[test]
    fn test_decode_bit_nonzero_is_true() {
        assert_eq!(SignalType::UInt16.decode_bit(&0x0100u16.to_ne_bytes()), Some(true));
        assert_eq!(SignalType::UInt64.decode_bit(&0u64.to_ne_bytes()), Some(false));
        assert_eq!(SignalType::Float32.decode_bit(&0.25f32.to_ne_bytes()), Some(true));
        // Negative zero is still zero.
        assert_eq!(SignalType::Float64.decode_bit(&(-0.0f64).to_ne_bytes()), Some(false));
        assert_eq!(SignalType::CharString.decode_bit(&[1]), None);
    }

    #[test]
    fn test_byte_sizes() {
        assert_eq!(SignalType::Bool.byte_size(), Some(1));
        assert_eq!(SignalType::UInt16.byte_size(), Some(2));
        assert_eq!(SignalType::Float32.byte_size(), Some(4));
        assert_eq!(SignalType::Int64.byte_size(), Some(8));
        assert_eq!(SignalType::Void.byte_size(), None);
    }
}
