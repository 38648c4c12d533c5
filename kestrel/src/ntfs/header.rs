use super::{error::NtfsError, segment::SafeSegmentNumber};
use crate::utils::nom_helper::{
    nom_unsigned_eight_bytes, nom_unsigned_four_bytes, nom_unsigned_two_bytes, Endian,
};
use log::warn;

/// FILE_RECORD_SEGMENT_HEADER
#[derive(Debug, Clone)]
pub(crate) struct FileRecordHeader {
    pub(crate) usa_offset: u16,
    pub(crate) usa_count: u16,
    pub(crate) logfile_sequence: u64,
    pub(crate) sequence: u16,
    pub(crate) link_count: u16,
    pub(crate) first_attribute_offset: u16,
    pub(crate) entry_flags: Vec<EntryFlags>,
    pub(crate) used_size: u32,
    pub(crate) total_size: u32,
    /// Base record reference. Non-zero only on child records
    pub(crate) base_index: u64,
    pub(crate) base_sequence: u16,
    pub(crate) next_attribute_id: u16,
    /// Segment number stored in the XP layout (high 16 + low 32 bits). Not
    /// present in the upgraded Windows 2000 layout, zero on records written
    /// before the field existed
    pub(crate) record_index: u64,
    /// Header uses the Windows 2000 layout, segment number must be
    /// synthesized from the caller-provided index
    pub(crate) upgraded_win2k: bool,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum EntryFlags {
    InUse,
    Directory,
    Extend,
    Index,
}

impl FileRecordHeader {
    /// Parse a file record header. `FILE` signature is required, `BAAD` and
    /// anything else is rejected
    pub(crate) fn parse_header(data: &[u8]) -> Result<FileRecordHeader, NtfsError> {
        if !FileRecordHeader::has_file_signature(data) {
            return Err(NtfsError::BadSignature);
        }
        let min_size = 48;
        if data.len() < min_size {
            return Err(NtfsError::Truncated);
        }
        let parse_result = FileRecordHeader::parse_fields(data);
        match parse_result {
            Ok((_, header)) => Ok(header),
            Err(_err) => Err(NtfsError::Truncated),
        }
    }

    fn parse_fields(data: &[u8]) -> nom::IResult<&[u8], FileRecordHeader> {
        let (input, _sig) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, usa_offset) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, usa_count) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, logfile_sequence) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, sequence) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, link_count) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, first_attribute_offset) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, flag_data) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, used_size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, total_size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, base_low) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, base_high) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, base_sequence) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, next_attribute_id) = nom_unsigned_two_bytes(input, Endian::Le)?;

        // The upgraded Windows 2000 layout ends here. The XP layout carries
        // the record's own segment number: high 16 bits, then low 32
        let win2k_usa_offset = 0x2a;
        let win2k_first_attribute = 0x30;
        let upgraded_win2k =
            usa_offset == win2k_usa_offset && first_attribute_offset == win2k_first_attribute;

        let (input, record_index) = if upgraded_win2k {
            (input, 0)
        } else {
            let (input, segment_high) = nom_unsigned_two_bytes(input, Endian::Le)?;
            let (input, segment_low) = nom_unsigned_four_bytes(input, Endian::Le)?;
            (input, ((segment_high as u64) << 32) | segment_low as u64)
        };

        let header = FileRecordHeader {
            usa_offset,
            usa_count,
            logfile_sequence,
            sequence,
            link_count,
            first_attribute_offset,
            entry_flags: FileRecordHeader::get_flags(flag_data),
            used_size,
            total_size,
            base_index: ((base_high as u64) << 32) | base_low as u64,
            base_sequence,
            next_attribute_id,
            record_index,
            upgraded_win2k,
        };

        Ok((input, header))
    }

    /// Check only the `FILE` signature without a full parse
    pub(crate) fn has_file_signature(data: &[u8]) -> bool {
        data.len() >= 4 && &data[0..4] == b"FILE"
    }

    /// Synthesize the safe segment number for this record. The caller
    /// provides the record's position in the MFT, needed for the upgraded
    /// Windows 2000 layout whose header carries no segment field and for
    /// older records that left it zero
    pub(crate) fn safe_segment(&self, record_index: u64) -> SafeSegmentNumber {
        if self.upgraded_win2k {
            warn!(
                "[ntfs] Record {record_index} uses the upgraded Windows 2000 layout, synthesizing segment number"
            );
            return SafeSegmentNumber::new(record_index, self.sequence);
        }
        if self.record_index != 0 {
            return SafeSegmentNumber::new(self.record_index, self.sequence);
        }
        SafeSegmentNumber::new(record_index, self.sequence)
    }

    pub(crate) fn is_in_use(&self) -> bool {
        self.entry_flags.contains(&EntryFlags::InUse)
    }

    /// Base record reference is zero on base records
    pub(crate) fn has_base(&self) -> bool {
        self.base_index != 0
    }

    fn get_flags(data: u16) -> Vec<EntryFlags> {
        let mut flags = Vec::new();
        if (data & 0x1) == 0x1 {
            flags.push(EntryFlags::InUse);
        }
        if (data & 0x2) == 0x2 {
            flags.push(EntryFlags::Directory);
        }
        if (data & 0x4) == 0x4 {
            flags.push(EntryFlags::Extend);
        }
        if (data & 0x8) == 0x8 {
            flags.push(EntryFlags::Index);
        }

        flags
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryFlags, FileRecordHeader};
    use crate::ntfs::error::NtfsError;

    #[test]
    fn test_parse_header() {
        let test = [
            70, 73, 76, 69, 48, 0, 3, 0, 182, 200, 59, 224, 6, 0, 0, 0, 1, 0, 1, 0, 56, 0, 1, 0,
            80, 2, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 23, 0, 0, 0, 0, 0, 0, 0,
        ];

        let result = FileRecordHeader::parse_header(&test).unwrap();
        assert_eq!(result.used_size, 592);
        assert_eq!(result.total_size, 1024);
        assert_eq!(result.logfile_sequence, 29531818166);
        assert_eq!(result.sequence, 1);
        assert_eq!(result.link_count, 1);
        assert_eq!(result.base_index, 0);
        assert_eq!(result.has_base(), false);
        assert_eq!(result.next_attribute_id, 23);
        assert_eq!(result.entry_flags, vec![EntryFlags::InUse]);
        assert_eq!(result.upgraded_win2k, false);

        let safe = result.safe_segment(23);
        assert_eq!(safe.index, 23);
        assert_eq!(safe.sequence, 1);
    }

    #[test]
    fn test_bad_signature() {
        let test = [0u8; 48];
        let result = FileRecordHeader::parse_header(&test);
        assert_eq!(result.unwrap_err(), NtfsError::BadSignature);
        assert_eq!(FileRecordHeader::has_file_signature(&test), false);
    }

    #[test]
    fn test_upgraded_win2k_layout() {
        let mut test = vec![0u8; 48];
        test[0..4].copy_from_slice(b"FILE");
        // usa_offset 0x2A and first attribute offset 0x30 identify records
        // upgraded in place from Windows 2000
        test[4] = 0x2a;
        test[6] = 3;
        test[16] = 9; // sequence
        test[20] = 0x30;
        test[22] = 1; // in use

        let result = FileRecordHeader::parse_header(&test).unwrap();
        assert_eq!(result.upgraded_win2k, true);
        let safe = result.safe_segment(77);
        assert_eq!(safe.index, 77);
        assert_eq!(safe.sequence, 9);
    }

    #[test]
    fn test_get_flags() {
        let result = FileRecordHeader::get_flags(8);
        assert_eq!(result, vec![EntryFlags::Index]);
    }
}
