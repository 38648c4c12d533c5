use crate::utils::{
    nom_helper::{
        nom_data, nom_unsigned_eight_bytes, nom_unsigned_four_bytes, nom_unsigned_one_byte,
        nom_unsigned_two_bytes, Endian,
    },
    strings::extract_utf16_string,
};
use log::warn;
use serde::Serialize;

/// ATTRIBUTE_RECORD_HEADER common fields plus the resident or non-resident
/// extension
#[derive(Debug, Clone)]
pub struct AttributeHeader {
    pub(crate) attrib_type: AttributeType,
    pub(crate) type_code: u32,
    /**Includes the `attrib_type` and size itself */
    pub(crate) size: u32,
    pub(crate) form: ResidentFlag,
    pub(crate) name: String,
    pub(crate) name_size: u8,
    pub(crate) name_offset: u16,
    pub(crate) data_flags: Vec<DataFlags>,
    pub(crate) instance: u16,
    pub(crate) resident: Option<ResidentHeader>,
    pub(crate) non_resident: Option<NonResidentHeader>,
}

#[derive(Debug, Clone)]
pub struct ResidentHeader {
    pub(crate) value_size: u32,
    pub(crate) value_offset: u16,
    pub(crate) _indexed: u8,
}

#[derive(Debug, Clone)]
pub struct NonResidentHeader {
    pub(crate) first_vcn: u64,
    pub(crate) last_vcn: u64,
    pub(crate) run_list_offset: u16,
    pub(crate) compression_unit: u16,
    pub(crate) allocated_size: u64,
    /**Not valid if first VCN is non-zero */
    pub(crate) data_size: u64,
    /**Not valid if first VCN is non-zero */
    pub(crate) valid_size: u64,
    /**Only present when the compression unit is non-zero */
    pub(crate) total_allocated_size: u64,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub enum AttributeType {
    Unused,
    StandardInformation,
    AttributeList,
    FileName,
    ObjectId,
    SecurityDescriptor,
    VolumeName,
    VolumeInformation,
    Data,
    IndexRoot,
    IndexAllocation,
    Bitmap,
    ReparsePoint,
    EaInformation,
    Ea,
    PropertySet,
    LoggedUtilityStream,
    End,
    Unknown,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ResidentFlag {
    Resident,
    NonResident,
}

#[derive(Debug, PartialEq, Clone, Copy, Serialize)]
pub enum DataFlags {
    /**LZNT1 */
    Compressed,
    Encrypted,
    Sparse,
}

impl AttributeHeader {
    /// Parse one attribute record header starting at `data`. The caller is
    /// expected to have verified the type code is not the end sentinel
    pub(crate) fn parse_header(data: &[u8]) -> nom::IResult<&[u8], AttributeHeader> {
        let (input, type_code) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, form_data) = nom_unsigned_one_byte(input, Endian::Le)?;
        let (input, name_size) = nom_unsigned_one_byte(input, Endian::Le)?;
        let (input, name_offset) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, flag_data) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, instance) = nom_unsigned_two_bytes(input, Endian::Le)?;

        let mut header = AttributeHeader {
            attrib_type: AttributeHeader::get_type(type_code),
            type_code,
            size,
            form: AttributeHeader::get_form(form_data),
            name: String::new(),
            name_size,
            name_offset,
            data_flags: AttributeHeader::get_data_flags(flag_data),
            instance,
            resident: None,
            non_resident: None,
        };

        let input = match header.form {
            ResidentFlag::Resident => {
                let (input, value_size) = nom_unsigned_four_bytes(input, Endian::Le)?;
                let (input, value_offset) = nom_unsigned_two_bytes(input, Endian::Le)?;
                let (input, indexed) = nom_unsigned_one_byte(input, Endian::Le)?;
                let (input, _padding) = nom_unsigned_one_byte(input, Endian::Le)?;
                header.resident = Some(ResidentHeader {
                    value_size,
                    value_offset,
                    _indexed: indexed,
                });
                input
            }
            ResidentFlag::NonResident => {
                let (input, first_vcn) = nom_unsigned_eight_bytes(input, Endian::Le)?;
                let (input, last_vcn) = nom_unsigned_eight_bytes(input, Endian::Le)?;
                let (input, run_list_offset) = nom_unsigned_two_bytes(input, Endian::Le)?;
                let (input, compression_unit) = nom_unsigned_two_bytes(input, Endian::Le)?;
                let (input, _padding) = nom_unsigned_four_bytes(input, Endian::Le)?;
                let (input, allocated_size) = nom_unsigned_eight_bytes(input, Endian::Le)?;
                let (input, data_size) = nom_unsigned_eight_bytes(input, Endian::Le)?;
                let (mut input, valid_size) = nom_unsigned_eight_bytes(input, Endian::Le)?;

                let mut total_allocated_size = 0;
                if compression_unit != 0 {
                    let (remaining, total) = nom_unsigned_eight_bytes(input, Endian::Le)?;
                    total_allocated_size = total;
                    input = remaining;
                }
                header.non_resident = Some(NonResidentHeader {
                    first_vcn,
                    last_vcn,
                    run_list_offset,
                    compression_unit,
                    allocated_size,
                    data_size,
                    valid_size,
                    total_allocated_size,
                });
                input
            }
        };

        if header.name_size != 0 {
            // Name offset is relative to the attribute start
            let utf16_adjust = 2;
            let (name_start, _) = nom_data(data, header.name_offset as u64)?;
            let (_, name_data) = nom_data(name_start, header.name_size as u64 * utf16_adjust)?;
            header.name = extract_utf16_string(name_data);
        }

        Ok((input, header))
    }

    /// Determine attribute type
    pub(crate) fn get_type(data: u32) -> AttributeType {
        match data {
            0x0 => AttributeType::Unused,
            0x10 => AttributeType::StandardInformation,
            0x20 => AttributeType::AttributeList,
            0x30 => AttributeType::FileName,
            0x40 => AttributeType::ObjectId,
            0x50 => AttributeType::SecurityDescriptor,
            0x60 => AttributeType::VolumeName,
            0x70 => AttributeType::VolumeInformation,
            0x80 => AttributeType::Data,
            0x90 => AttributeType::IndexRoot,
            0xa0 => AttributeType::IndexAllocation,
            0xb0 => AttributeType::Bitmap,
            0xc0 => AttributeType::ReparsePoint,
            0xd0 => AttributeType::EaInformation,
            0xe0 => AttributeType::Ea,
            0xf0 => AttributeType::PropertySet,
            0x100 => AttributeType::LoggedUtilityStream,
            0xffffffff => AttributeType::End,
            _ => {
                warn!("[ntfs] Got unknown attribute type {data:#x}");
                AttributeType::Unknown
            }
        }
    }

    fn get_form(data: u8) -> ResidentFlag {
        // Any non-zero form code means non-resident
        if data == 0 {
            ResidentFlag::Resident
        } else {
            ResidentFlag::NonResident
        }
    }

    /// Determine data flags for the attribute value
    fn get_data_flags(data: u16) -> Vec<DataFlags> {
        let mut flags = Vec::new();
        if (data & 0xff) != 0 {
            flags.push(DataFlags::Compressed);
        }
        if (data & 0x4000) == 0x4000 {
            flags.push(DataFlags::Encrypted);
        }
        if (data & 0x8000) == 0x8000 {
            flags.push(DataFlags::Sparse);
        }

        flags
    }
}
