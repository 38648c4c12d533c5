use crate::ntfs::attributes::header::DataFlags;
use crate::utils::nom_helper::{nom_data, nom_unsigned_one_byte, Endian};
use serde::Serialize;

/// One run of a non-resident attribute. A hole (no LCN) is a sparse run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NonResidentExtent {
    pub vcn_start: u64,
    /// Starting logical cluster, None for sparse runs
    pub lcn: Option<u64>,
    pub clusters: u64,
}

/// One stream-backed attribute ($DATA, $INDEX_ALLOCATION, $BITMAP, $EA...).
/// Resident values are carried inline, non-resident values through the
/// extent list
#[derive(Debug, Clone, Serialize)]
pub struct DataAttribute {
    pub name: String,
    pub instance: u16,
    pub resident: Option<Vec<u8>>,
    pub extents: Vec<NonResidentExtent>,
    pub data_size: u64,
    pub allocated_size: u64,
    pub valid_size: u64,
    /// Log2 of clusters per compression unit, zero when not compressed
    pub compression_unit: u16,
    pub flags: Vec<DataFlags>,
    pub first_vcn: u64,
    pub last_vcn: u64,
}

impl DataAttribute {
    pub fn size(&self) -> u64 {
        match &self.resident {
            Some(value) => value.len() as u64,
            None => self.data_size,
        }
    }

    pub fn is_resident(&self) -> bool {
        self.resident.is_some()
    }

    /// The unnamed stream is the file's default content
    pub fn is_unnamed(&self) -> bool {
        self.name.is_empty()
    }
}

/// Decode a data-run list into extents. Cluster offsets are deltas from the
/// previous run and signed, sparse runs carry no offset at all
pub(crate) fn parse_run_list(data: &[u8], first_vcn: u64) -> nom::IResult<&[u8], Vec<NonResidentExtent>> {
    let mut remaining = data;
    let mut extents = Vec::new();

    let mut vcn = first_vcn;
    let mut lcn: i64 = 0;

    while !remaining.is_empty() {
        let (input, header) = nom_unsigned_one_byte(remaining, Endian::Le)?;
        if header == 0 {
            remaining = input;
            break;
        }

        let length_size = header & 0xf;
        let offset_size = header >> 4;
        let max_field = 8;
        if length_size == 0 || length_size > max_field || offset_size > max_field {
            // Malformed run list, keep what was decoded so far
            break;
        }

        let (input, length_data) = nom_data(input, length_size as u64)?;
        let clusters = unsigned_value(length_data);

        let (input, extent) = if offset_size == 0 {
            (
                input,
                NonResidentExtent {
                    vcn_start: vcn,
                    lcn: None,
                    clusters,
                },
            )
        } else {
            let (input, offset_data) = nom_data(input, offset_size as u64)?;
            lcn += signed_value(offset_data);
            (
                input,
                NonResidentExtent {
                    vcn_start: vcn,
                    lcn: Some(lcn as u64),
                    clusters,
                },
            )
        };

        vcn += clusters;
        extents.push(extent);
        remaining = input;
    }

    Ok((remaining, extents))
}

/// Little-endian unsigned value of one to eight bytes
fn unsigned_value(data: &[u8]) -> u64 {
    let mut value = 0;
    for (index, byte) in data.iter().enumerate() {
        value |= (*byte as u64) << (index * 8);
    }
    value
}

/// Little-endian sign-extended value of one to eight bytes
fn signed_value(data: &[u8]) -> i64 {
    if data.is_empty() {
        return 0;
    }
    let mut value = unsigned_value(data);
    let bits = data.len() * 8;
    let sign = 1u64 << (bits - 1);
    if bits < 64 && (value & sign) != 0 {
        value |= !0u64 << bits;
    }
    value as i64
}

#[cfg(test)]
mod tests {
    use super::{parse_run_list, signed_value, unsigned_value};

    #[test]
    fn test_parse_run_list() {
        // 16 clusters at LCN 100, 8 sparse clusters, 4 clusters at LCN 90
        let test = [0x11, 16, 100, 0x01, 8, 0x11, 4, 0xf6, 0x00];
        let (_, extents) = parse_run_list(&test, 0).unwrap();

        assert_eq!(extents.len(), 3);
        assert_eq!(extents[0].vcn_start, 0);
        assert_eq!(extents[0].lcn, Some(100));
        assert_eq!(extents[0].clusters, 16);

        assert_eq!(extents[1].vcn_start, 16);
        assert_eq!(extents[1].lcn, None);
        assert_eq!(extents[1].clusters, 8);

        assert_eq!(extents[2].vcn_start, 24);
        assert_eq!(extents[2].lcn, Some(90));
        assert_eq!(extents[2].clusters, 4);
    }

    #[test]
    fn test_parse_run_list_multi_byte() {
        // Header 0x21: one length byte, two offset bytes
        let test = [0x21, 0x4a, 0x00, 0x10, 0x00];
        let (_, extents) = parse_run_list(&test, 0).unwrap();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].clusters, 0x4a);
        assert_eq!(extents[0].lcn, Some(0x1000));
    }

    #[test]
    fn test_unsigned_value() {
        assert_eq!(unsigned_value(&[0x34, 0x12]), 0x1234);
    }

    #[test]
    fn test_signed_value() {
        assert_eq!(signed_value(&[0xf6]), -10);
        assert_eq!(signed_value(&[0x34, 0x12]), 0x1234);
        assert_eq!(signed_value(&[0x00, 0x80]), -32768);
    }
}
