//! Byte order of multi-byte scalars stored in a memory range

use core::fmt;

/// Byte order used by scalar get/put on a memory range
///
/// Bulk copies ignore byte order entirely; only scalar accessors consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Most significant byte first
    BigEndian,
    /// Least significant byte first
    LittleEndian,
}

impl ByteOrder {
    /// Byte order of the host CPU
    #[inline]
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::LittleEndian
        } else {
            Self::BigEndian
        }
    }

    /// The opposite byte order
    #[inline]
    pub const fn reverse(self) -> Self {
        match self {
            Self::BigEndian => Self::LittleEndian,
            Self::LittleEndian => Self::BigEndian,
        }
    }

    /// Whether scalars in this order can be read without swapping
    #[inline]
    pub const fn is_native(self) -> bool {
        matches!(
            (self, Self::native()),
            (Self::BigEndian, Self::BigEndian) | (Self::LittleEndian, Self::LittleEndian)
        )
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BigEndian => f.write_str("BIG_ENDIAN"),
            Self::LittleEndian => f.write_str("LITTLE_ENDIAN"),
        }
    }
}
