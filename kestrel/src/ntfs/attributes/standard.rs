use crate::utils::nom_helper::{
    nom_unsigned_eight_bytes, nom_unsigned_four_bytes, Endian,
};
use serde::Serialize;

/// $STANDARD_INFORMATION. Timestamps are FILETIME
#[derive(Debug, Clone, Serialize)]
pub struct StandardInfo {
    pub created: u64,
    pub modified: u64,
    /// MFT entry change time
    pub changed: u64,
    pub accessed: u64,
    pub file_attributes: u32,
    pub max_versions: u32,
    pub version: u32,
    pub class_id: u32,
    pub owner_id: u32,
    pub security_id: u32,
    pub quota: u64,
    pub usn: u64,
}

impl StandardInfo {
    /// Parse $STANDARD_INFORMATION. The short (NTFS 1.x) form stops after the
    /// flags, the remaining fields read as zero
    pub(crate) fn parse_standard_info(data: &[u8]) -> nom::IResult<&[u8], StandardInfo> {
        let (input, created) = nom_unsigned_eight_bytes(data, Endian::Le)?;
        let (input, modified) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, changed) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, accessed) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, file_attributes) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, max_versions) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, version) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, class_id) = nom_unsigned_four_bytes(input, Endian::Le)?;

        let mut info = StandardInfo {
            created,
            modified,
            changed,
            accessed,
            file_attributes,
            max_versions,
            version,
            class_id,
            owner_id: 0,
            security_id: 0,
            quota: 0,
            usn: 0,
        };

        let extended_size = 24;
        if input.len() < extended_size {
            return Ok((input, info));
        }

        let (input, owner_id) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, security_id) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, quota) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, usn) = nom_unsigned_eight_bytes(input, Endian::Le)?;

        info.owner_id = owner_id;
        info.security_id = security_id;
        info.quota = quota;
        info.usn = usn;

        Ok((input, info))
    }
}
