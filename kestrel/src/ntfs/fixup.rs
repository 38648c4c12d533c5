use super::error::NtfsError;
use crate::utils::nom_helper::{nom_unsigned_two_bytes, Endian};
use log::warn;

/// Multi-sector transfer protection values. The last two bytes of every
/// 512-byte block were replaced on disk with the update sequence number; the
/// originals live in the update sequence array of the header
pub(crate) struct Fixup {
    placeholder: u16,
    original: Vec<u16>,
}

impl Fixup {
    /// Parse the update sequence array. `count` is the on-disk count and
    /// includes the update sequence number itself
    pub(crate) fn get_fixup(data: &[u8], count: u16) -> nom::IResult<&[u8], Fixup> {
        let (mut input, placeholder) = nom_unsigned_two_bytes(data, Endian::Le)?;

        let mut original = Vec::new();
        let sectors = count.saturating_sub(1);
        let mut fixup_count = 0;
        while fixup_count < sectors {
            let (remaining, value) = nom_unsigned_two_bytes(input, Endian::Le)?;
            original.push(value);
            input = remaining;
            fixup_count += 1;
        }

        let fix = Fixup {
            placeholder,
            original,
        };

        Ok((input, fix))
    }

    /// Verify each 512-byte block ends in the update sequence number, then
    /// splice the stored originals back in. Mismatch means a torn write and
    /// the whole record is rejected
    pub(crate) fn apply_fixup(&self, data: &mut [u8]) -> Result<(), NtfsError> {
        let sector_size = 512;
        for (sector, original) in self.original.iter().enumerate() {
            let end = (sector + 1) * sector_size;
            if end > data.len() {
                break;
            }
            let stored = u16::from_le_bytes([data[end - 2], data[end - 1]]);
            if stored != self.placeholder {
                warn!(
                    "[ntfs] Fixup mismatch in sector {sector}: {stored:#x} != {:#x}",
                    self.placeholder
                );
                return Err(NtfsError::BadFixup);
            }
            let bytes = original.to_le_bytes();
            data[end - 2] = bytes[0];
            data[end - 1] = bytes[1];
        }
        Ok(())
    }
}
