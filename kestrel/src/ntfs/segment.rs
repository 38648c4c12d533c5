use crate::utils::nom_helper::{nom_unsigned_four_bytes, nom_unsigned_two_bytes, Endian};
use serde::Serialize;
use std::fmt;

/// On-disk 8-byte MFT segment reference: 48-bit record index split into
/// low/high halves plus a 16-bit sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentReference {
    pub segment_low: u32,
    pub segment_high: u16,
    pub sequence: u16,
}

impl SegmentReference {
    pub(crate) fn parse(data: &[u8]) -> nom::IResult<&[u8], SegmentReference> {
        let (input, segment_low) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, segment_high) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, sequence) = nom_unsigned_two_bytes(input, Endian::Le)?;

        let reference = SegmentReference {
            segment_low,
            segment_high,
            sequence,
        };
        Ok((input, reference))
    }

    /// The 48-bit record index
    pub fn index(&self) -> u64 {
        ((self.segment_high as u64) << 32) | self.segment_low as u64
    }

    pub fn to_safe(&self) -> SafeSegmentNumber {
        SafeSegmentNumber {
            index: self.index(),
            sequence: self.sequence,
        }
    }

    pub(crate) fn to_bytes(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0..4].copy_from_slice(&self.segment_low.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.segment_high.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.sequence.to_le_bytes());
        bytes
    }
}

/// 64-bit record identity: 48-bit index plus the slot's sequence number.
/// Two records with equal index but different sequence are distinct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SafeSegmentNumber {
    pub index: u64,
    pub sequence: u16,
}

impl SafeSegmentNumber {
    pub fn new(index: u64, sequence: u16) -> SafeSegmentNumber {
        let index_mask = 0xffff_ffff_ffff;
        SafeSegmentNumber {
            index: index & index_mask,
            sequence,
        }
    }

    /// Pack into the single u64 used as map key and output value
    pub fn as_u64(&self) -> u64 {
        ((self.sequence as u64) << 48) | self.index
    }

    pub fn from_u64(value: u64) -> SafeSegmentNumber {
        let index_mask = 0xffff_ffff_ffff;
        SafeSegmentNumber {
            index: value & index_mask,
            sequence: (value >> 48) as u16,
        }
    }

    /// The on-disk reference form, used for targeted fetches
    pub fn to_reference(&self) -> SegmentReference {
        SegmentReference {
            segment_low: self.index as u32,
            segment_high: (self.index >> 32) as u16,
            sequence: self.sequence,
        }
    }
}

impl fmt::Display for SafeSegmentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.as_u64())
    }
}
