use crate::utils::{
    nom_helper::{
        nom_data, nom_unsigned_four_bytes, nom_unsigned_one_byte, nom_unsigned_two_bytes, Endian,
    },
    strings::extract_utf8_string,
};
use serde::Serialize;

/// $EA_INFORMATION value
#[derive(Debug, Clone, Serialize)]
pub struct EaInformation {
    pub packed_size: u16,
    pub need_count: u16,
    pub unpacked_size: u32,
}

/// One FILE_FULL_EA_INFORMATION entry from a $EA value. Names are ASCII
#[derive(Debug, Clone, Serialize)]
pub struct EaEntry {
    pub flags: u8,
    pub name: String,
    pub value: Vec<u8>,
}

impl EaInformation {
    pub(crate) fn parse_ea_information(data: &[u8]) -> nom::IResult<&[u8], EaInformation> {
        let (input, packed_size) = nom_unsigned_two_bytes(data, Endian::Le)?;
        let (input, need_count) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, unpacked_size) = nom_unsigned_four_bytes(input, Endian::Le)?;

        let info = EaInformation {
            packed_size,
            need_count,
            unpacked_size,
        };
        Ok((input, info))
    }
}

/// Walk the packed extended attribute entries of a $EA value
pub(crate) fn parse_ea_entries(data: &[u8]) -> Vec<EaEntry> {
    let mut entries = Vec::new();
    let mut remaining = data;
    let min_size = 8;

    while remaining.len() >= min_size {
        let entry_result = parse_ea_entry(remaining);
        let (next_offset, entry) = match entry_result {
            Ok(result) => result,
            Err(_err) => break,
        };
        entries.push(entry);

        if next_offset == 0 || next_offset as usize > remaining.len() {
            break;
        }
        remaining = &remaining[next_offset as usize..];
    }

    entries
}

fn parse_ea_entry(data: &[u8]) -> Result<(u32, EaEntry), nom::Err<nom::error::Error<&[u8]>>> {
    let (input, next_offset) = nom_unsigned_four_bytes(data, Endian::Le)?;
    let (input, flags) = nom_unsigned_one_byte(input, Endian::Le)?;
    let (input, name_size) = nom_unsigned_one_byte(input, Endian::Le)?;
    let (input, value_size) = nom_unsigned_two_bytes(input, Endian::Le)?;

    let (input, name_data) = nom_data(input, name_size as u64)?;
    // NUL terminator between name and value
    let (input, _) = nom_data(input, 1)?;
    let take_size = std::cmp::min(value_size as u64, input.len() as u64);
    let (_, value_data) = nom_data(input, take_size)?;

    let entry = EaEntry {
        flags,
        name: extract_utf8_string(name_data),
        value: value_data.to_vec(),
    };

    Ok((next_offset, entry))
}
