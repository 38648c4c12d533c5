use crate::ntfs::segment::SegmentReference;
use crate::utils::{
    nom_helper::{
        nom_data, nom_unsigned_eight_bytes, nom_unsigned_four_bytes, nom_unsigned_one_byte,
        Endian,
    },
    strings::extract_utf16_string,
};
use serde::Serialize;

/// $FILE_NAME. Contains the parent directory reference, a second set of
/// timestamps, and the name itself
#[derive(Debug, Clone, Serialize)]
pub struct FileName {
    pub parent: SegmentReference,
    pub created: u64,
    pub modified: u64,
    pub changed: u64,
    pub accessed: u64,
    pub allocated_size: u64,
    pub size: u64,
    pub file_attributes: u32,
    pub extended_data: u32,
    pub name_size: u8,
    pub namespace: Namespace,
    /**UTF16 on disk (but not strict UTF16) */
    pub name: String,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub enum Namespace {
    Posix,
    Windows,
    Dos,
    WindowsDos,
    Unknown,
}

impl FileName {
    /// Parse a $FILE_NAME value
    pub(crate) fn parse_filename(data: &[u8]) -> nom::IResult<&[u8], FileName> {
        let (input, parent) = SegmentReference::parse(data)?;

        let (input, created) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, modified) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, changed) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, accessed) = nom_unsigned_eight_bytes(input, Endian::Le)?;

        let (input, allocated_size) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, size) = nom_unsigned_eight_bytes(input, Endian::Le)?;

        let (input, file_attributes) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, extended_data) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, name_size) = nom_unsigned_one_byte(input, Endian::Le)?;
        let (input, namespace_data) = nom_unsigned_one_byte(input, Endian::Le)?;

        // adjust for UTF16. Double the name size
        let adjust = 2;
        let (input, name_data) = nom_data(input, name_size as u64 * adjust)?;
        let name = extract_utf16_string(name_data);

        let filename = FileName {
            parent,
            created,
            modified,
            changed,
            accessed,
            allocated_size,
            size,
            file_attributes,
            extended_data,
            name_size,
            namespace: FileName::get_namespace(namespace_data),
            name,
        };

        Ok((input, filename))
    }

    /// Determine Namespace associated with entry
    fn get_namespace(space: u8) -> Namespace {
        match space {
            0 => Namespace::Posix,
            1 => Namespace::Windows,
            2 => Namespace::Dos,
            3 => Namespace::WindowsDos,
            _ => Namespace::Unknown,
        }
    }

    /// DOS (8.3) names duplicate a Windows name on the same record
    pub(crate) fn is_dos(&self) -> bool {
        self.namespace == Namespace::Dos
    }

    pub(crate) fn is_directory_flag(&self) -> bool {
        let directory = 0x10000000;
        (self.file_attributes & directory) == directory
    }
}
