use crate::utils::nom_helper::{
    nom_data, nom_unsigned_four_bytes, nom_unsigned_two_bytes, Endian,
};
use serde::Serialize;

/// $REPARSE_POINT value: tag plus the tag-specific blob
#[derive(Debug, Clone, Serialize)]
pub struct ReparsePoint {
    pub tag: u32,
    pub data_size: u16,
    pub data: Vec<u8>,
}

impl ReparsePoint {
    pub(crate) fn parse_reparse(data: &[u8]) -> nom::IResult<&[u8], ReparsePoint> {
        let (input, tag) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, data_size) = nom_unsigned_two_bytes(input, Endian::Le)?;
        let (input, _reserved) = nom_unsigned_two_bytes(input, Endian::Le)?;

        let take_size = std::cmp::min(data_size as u64, input.len() as u64);
        let (input, blob) = nom_data(input, take_size)?;

        let reparse = ReparsePoint {
            tag,
            data_size,
            data: blob.to_vec(),
        };

        Ok((input, reparse))
    }
}
