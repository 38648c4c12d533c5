use crate::ntfs::{attributes::filename::FileName, segment::SegmentReference};
use crate::utils::nom_helper::{
    nom_data, nom_unsigned_four_bytes, nom_unsigned_two_bytes, Endian,
};
use serde::Serialize;

/// $INDEX_ROOT resident value: root header, node header, and the first tier
/// of index entries
#[derive(Debug, Clone, Serialize)]
pub struct IndexRoot {
    pub indexed_type: u32,
    pub collation: u32,
    pub bytes_per_index: u32,
    pub clusters_per_index: u32,
    pub node: IndexNodeHeader,
    /// Raw entry area, walked by the $I30 and $SII consumers
    pub entries_data: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexNodeHeader {
    pub entries_offset: u32,
    pub total_size: u32,
    pub allocated_size: u32,
    pub is_branch: bool,
}

/// One fixed-format index entry keyed by $FILE_NAME ($I30)
#[derive(Debug, Clone, Serialize)]
pub struct I30Entry {
    pub reference: SegmentReference,
    pub entry_length: u16,
    pub key_length: u16,
    pub flags: u16,
    pub file_name: Option<FileName>,
}

impl I30Entry {
    pub fn is_last(&self) -> bool {
        let last = 0x2;
        (self.flags & last) == last
    }

    pub fn has_subnode(&self) -> bool {
        let subnode = 0x1;
        (self.flags & subnode) == subnode
    }
}

impl IndexRoot {
    /// Parse the $INDEX_ROOT value
    pub(crate) fn parse_root(data: &[u8]) -> nom::IResult<&[u8], IndexRoot> {
        let (input, indexed_type) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, collation) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, bytes_per_index) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, clusters_per_index) = nom_unsigned_four_bytes(input, Endian::Le)?;

        let node_start = input;
        let (_, node) = IndexNodeHeader::parse_node(input)?;

        // Entries offset is relative to the node header
        let (entry_start, _) = nom_data(node_start, node.entries_offset as u64)?;
        let available = node.total_size.saturating_sub(node.entries_offset) as u64;
        let take_size = std::cmp::min(available, entry_start.len() as u64);
        let (input, entries_data) = nom_data(entry_start, take_size)?;

        let root = IndexRoot {
            indexed_type,
            collation,
            bytes_per_index,
            clusters_per_index,
            node,
            entries_data: entries_data.to_vec(),
        };

        Ok((input, root))
    }
}

impl IndexNodeHeader {
    pub(crate) fn parse_node(data: &[u8]) -> nom::IResult<&[u8], IndexNodeHeader> {
        let (input, entries_offset) = nom_unsigned_four_bytes(data, Endian::Le)?;
        let (input, total_size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, allocated_size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, flags) = nom_unsigned_four_bytes(input, Endian::Le)?;

        let header = IndexNodeHeader {
            entries_offset,
            total_size,
            allocated_size,
            is_branch: flags == 1,
        };

        Ok((input, header))
    }
}

/// Walk $I30 entries until the end sentinel. Malformed lengths stop the walk
pub(crate) fn parse_i30_entries(data: &[u8]) -> Vec<I30Entry> {
    let mut entries = Vec::new();
    let mut remaining = data;
    let min_size = 16;

    while remaining.len() >= min_size {
        let entry_result = parse_i30_entry(remaining);
        let (entry_length, entry) = match entry_result {
            Ok((_, result)) => (result.entry_length, result),
            Err(_err) => break,
        };
        let last = entry.is_last();
        entries.push(entry);
        if last || entry_length as usize > remaining.len() || entry_length < min_size as u16 {
            break;
        }
        remaining = &remaining[entry_length as usize..];
    }

    entries
}

fn parse_i30_entry(data: &[u8]) -> nom::IResult<&[u8], I30Entry> {
    let (input, reference) = SegmentReference::parse(data)?;
    let (input, entry_length) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, key_length) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, flags) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, _padding) = nom_unsigned_two_bytes(input, Endian::Le)?;

    let mut entry = I30Entry {
        reference,
        entry_length,
        key_length,
        flags,
        file_name: None,
    };

    let min_filename = 66;
    if !entry.is_last() && key_length as usize >= min_filename && input.len() >= key_length as usize
    {
        let (_, key_data) = nom_data(input, key_length as u64)?;
        if let Ok((_, file_name)) = FileName::parse_filename(key_data) {
            entry.file_name = Some(file_name);
        }
    }

    Ok((input, entry))
}

#[cfg(test)]
mod tests {
    use super::{parse_i30_entries, IndexNodeHeader, IndexRoot};

    fn build_entry(name: &str, parent: u64, reference: u64, last: bool) -> Vec<u8> {
        let name_units: Vec<u16> = name.encode_utf16().collect();
        let key_length = if last { 0 } else { 66 + name_units.len() * 2 };
        let entry_length = (16 + key_length + 7) & !7;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&reference.to_le_bytes());
        bytes.extend_from_slice(&(entry_length as u16).to_le_bytes());
        bytes.extend_from_slice(&(key_length as u16).to_le_bytes());
        let flags: u16 = if last { 0x2 } else { 0x0 };
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        if last {
            return bytes;
        }

        // FILE_NAME key
        bytes.extend_from_slice(&parent.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 32]); // timestamps
        bytes.extend_from_slice(&[0u8; 16]); // sizes
        bytes.extend_from_slice(&[0u8; 8]); // attributes + extended
        bytes.push(name_units.len() as u8);
        bytes.push(1); // Windows namespace
        for unit in name_units {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        while bytes.len() % 8 != 0 {
            bytes.push(0);
        }
        bytes
    }

    #[test]
    fn test_parse_i30_entries() {
        let mut data = build_entry("alpha.txt", 5 | (5 << 48), 64 | (2 << 48), false);
        data.append(&mut build_entry("beta.txt", 5 | (5 << 48), 65 | (2 << 48), false));
        data.append(&mut build_entry("", 0, 0, true));

        let entries = parse_i30_entries(&data);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].file_name.as_ref().unwrap().name, "alpha.txt");
        assert_eq!(entries[0].reference.index(), 64);
        assert_eq!(entries[1].file_name.as_ref().unwrap().name, "beta.txt");
        assert_eq!(entries[2].is_last(), true);
        assert_eq!(entries[2].file_name.is_none(), true);
    }

    #[test]
    fn test_parse_root() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x30u32.to_le_bytes()); // indexed type
        data.extend_from_slice(&1u32.to_le_bytes()); // collation filename
        data.extend_from_slice(&4096u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());

        let entries = build_entry("", 0, 0, true);
        data.extend_from_slice(&16u32.to_le_bytes()); // entries offset
        data.extend_from_slice(&(16 + entries.len() as u32).to_le_bytes());
        data.extend_from_slice(&(16 + entries.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&entries);

        let (_, root) = IndexRoot::parse_root(&data).unwrap();
        assert_eq!(root.indexed_type, 0x30);
        assert_eq!(root.bytes_per_index, 4096);
        assert_eq!(root.node.is_branch, false);
        let parsed = super::parse_i30_entries(&root.entries_data);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].is_last(), true);
    }

    #[test]
    fn test_parse_node() {
        let test = [16, 0, 0, 0, 152, 0, 0, 0, 152, 0, 0, 0, 1, 0, 0, 0];
        let (_, result) = IndexNodeHeader::parse_node(&test).unwrap();
        assert_eq!(result.allocated_size, 152);
        assert_eq!(result.total_size, 152);
        assert_eq!(result.entries_offset, 16);
        assert_eq!(result.is_branch, true);
    }
}
