use crate::utils::nom_helper::nom_data;
use serde::Serialize;

/// $OBJECT_ID value. Only the object id itself is guaranteed present, the
/// birth fields are optional
#[derive(Debug, Clone, Serialize)]
pub struct ObjectId {
    pub object_id: String,
    pub birth_volume_id: String,
    pub birth_object_id: String,
    pub domain_id: String,
}

impl ObjectId {
    pub(crate) fn parse_object_id(data: &[u8]) -> nom::IResult<&[u8], ObjectId> {
        let (input, object_id) = nom_data(data, 16)?;

        let mut object = ObjectId {
            object_id: format_guid(object_id),
            birth_volume_id: String::new(),
            birth_object_id: String::new(),
            domain_id: String::new(),
        };

        let guid_size = 16;
        if input.len() < guid_size * 3 {
            return Ok((input, object));
        }

        let (input, birth_volume) = nom_data(input, 16)?;
        let (input, birth_object) = nom_data(input, 16)?;
        let (input, domain) = nom_data(input, 16)?;
        object.birth_volume_id = format_guid(birth_volume);
        object.birth_object_id = format_guid(birth_object);
        object.domain_id = format_guid(domain);

        Ok((input, object))
    }
}

/// Format 16 little-endian GUID bytes in the usual text form
pub(crate) fn format_guid(data: &[u8]) -> String {
    if data.len() < 16 {
        return String::new();
    }
    format!(
        "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        u32::from_le_bytes([data[0], data[1], data[2], data[3]]),
        u16::from_le_bytes([data[4], data[5]]),
        u16::from_le_bytes([data[6], data[7]]),
        data[8],
        data[9],
        data[10],
        data[11],
        data[12],
        data[13],
        data[14],
        data[15],
    )
}
