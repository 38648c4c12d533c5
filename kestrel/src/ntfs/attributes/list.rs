use crate::ntfs::{attributes::header::AttributeType, segment::SegmentReference};
use crate::utils::{
    nom_helper::{
        nom_data, nom_unsigned_eight_bytes, nom_unsigned_four_bytes, nom_unsigned_one_byte,
        nom_unsigned_two_bytes, Endian,
    },
    strings::extract_utf16_string,
};
use serde::Serialize;

/// One row of a record's $ATTRIBUTE_LIST. Points at the record that holds the
/// real attribute
#[derive(Debug, Clone, Serialize)]
pub struct AttributeListEntry {
    pub attrib_type: AttributeType,
    pub type_code: u32,
    pub record_length: u16,
    pub name_size: u8,
    pub name_offset: u8,
    pub lowest_vcn: u64,
    /// Record holding the attribute. May be the listing record itself
    pub target: SegmentReference,
    pub instance: u16,
    pub name: String,
    /// Set by the walker once the target record is loaded and parsed
    pub resolved: bool,
}

impl AttributeListEntry {
    /// Parse every entry in an $ATTRIBUTE_LIST value
    pub(crate) fn parse_list(data: &[u8]) -> nom::IResult<&[u8], Vec<AttributeListEntry>> {
        let mut remaining = data;
        let min_size = 26;
        let mut entries = Vec::new();

        while remaining.len() >= min_size {
            let (_, entry) = AttributeListEntry::parse_entry(remaining)?;
            if entry.record_length < min_size as u16 {
                break;
            }
            let (input, _) = nom_data(remaining, entry.record_length as u64)?;
            remaining = input;
            entries.push(entry);
        }

        Ok((remaining, entries))
    }

    fn parse_entry(data: &[u8]) -> nom::IResult<&[u8], AttributeListEntry> {
        let (input, type_code) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, record_length) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, name_size) = nom_unsigned_one_byte(input, Endian::Le)?;
        let (input, name_offset) = nom_unsigned_one_byte(input, Endian::Le)?;
        let (input, lowest_vcn) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, target) = SegmentReference::parse(input)?;
        let (input, instance) = nom_unsigned_two_bytes(input, Endian::Le)?;

        let mut name = String::new();
        if name_size != 0 {
            let utf16_adjust = 2;
            let (name_start, _) = nom_data(data, name_offset as u64)?;
            let (_, name_data) = nom_data(name_start, name_size as u64 * utf16_adjust)?;
            name = extract_utf16_string(name_data);
        }

        let entry = AttributeListEntry {
            attrib_type: crate::ntfs::attributes::header::AttributeHeader::get_type(type_code),
            type_code,
            record_length,
            name_size,
            name_offset,
            lowest_vcn,
            target,
            instance,
            name,
            resolved: false,
        };

        Ok((input, entry))
    }

    /// Serialize back to the on-disk layout. Padding beyond the name is zero,
    /// matching how Windows writes entries
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.record_length as usize];
        bytes[0..4].copy_from_slice(&self.type_code.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.record_length.to_le_bytes());
        bytes[6] = self.name_size;
        bytes[7] = self.name_offset;
        bytes[8..16].copy_from_slice(&self.lowest_vcn.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.target.to_bytes());
        bytes[24..26].copy_from_slice(&self.instance.to_le_bytes());

        let mut offset = self.name_offset as usize;
        for value in self.name.encode_utf16() {
            if offset + 2 > bytes.len() {
                break;
            }
            bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            offset += 2;
        }
        bytes
    }
}
