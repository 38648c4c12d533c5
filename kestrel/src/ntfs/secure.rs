use super::{
    attributes::{data::DataAttribute, index::IndexRoot},
    error::NtfsError,
    fixup::Fixup,
    record::{AttributeValue, MftAttribute},
    stream::{read_all, DataStream, Whence},
};
use crate::filesystem::volume::VolumeReader;
use crate::utils::nom_helper::{
    nom_data, nom_unsigned_eight_bytes, nom_unsigned_four_bytes, nom_unsigned_two_bytes, Endian,
};
use common::windows::SecurityDescriptorInfo;
use log::warn;

/// One row of the $SII index: security id keyed, SDS-locator valued
#[derive(Debug, Clone, Copy)]
struct SiiEntry {
    security_id: u32,
    hash: u32,
    sds_offset: u64,
    sds_size: u32,
}

/// Drive the $Secure record: walk the $SII index (security id to $SDS
/// locator), then read each SECURITY_DESCRIPTOR_ENTRY out of the $SDS stream
pub(crate) fn walk_secure(
    reader: &mut dyn VolumeReader,
    cluster_size: u32,
    attributes: &[&MftAttribute],
) -> Result<Vec<SecurityDescriptorInfo>, NtfsError> {
    let mut descriptors = Vec::new();

    let sii_root = attributes.iter().find_map(|attr| match &attr.value {
        AttributeValue::IndexRoot(root) if attr.name() == "$SII" => Some(root),
        _ => None,
    });
    let sds = attributes.iter().find_map(|attr| match &attr.value {
        AttributeValue::Data(data) if attr.name() == "$SDS" => Some(data),
        _ => None,
    });

    let (sii_root, sds) = match (sii_root, sds) {
        (Some(root), Some(sds)) => (root, sds),
        _ => return Ok(descriptors),
    };

    let mut entries = Vec::new();
    collect_sii_entries(&sii_root.entries_data, &mut entries);
    entries.append(&mut allocation_entries(
        reader,
        cluster_size,
        attributes,
        sii_root,
    )?);

    let mut stream = DataStream::new(sds, cluster_size);
    for entry in entries {
        let descriptor_result = read_descriptor(reader, &mut stream, &entry);
        match descriptor_result {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(err) => {
                warn!(
                    "[ntfs] Could not read security descriptor {}: {err:?}",
                    entry.security_id
                );
            }
        }
    }

    Ok(descriptors)
}

/// $SII entries living in $INDEX_ALLOCATION blocks
fn allocation_entries(
    reader: &mut dyn VolumeReader,
    cluster_size: u32,
    attributes: &[&MftAttribute],
    root: &IndexRoot,
) -> Result<Vec<SiiEntry>, NtfsError> {
    let mut entries = Vec::new();

    let allocation: Option<&DataAttribute> = attributes.iter().find_map(|attr| match &attr.value {
        AttributeValue::IndexAllocation(stream) if attr.name() == "$SII" => Some(stream),
        _ => None,
    });
    let allocation = match allocation {
        Some(result) => result,
        None => return Ok(entries),
    };

    let block_size = root.bytes_per_index as usize;
    if block_size == 0 {
        return Ok(entries);
    }
    let data = read_all(reader, cluster_size, allocation)?;

    for block in data.chunks(block_size) {
        if block.len() < block_size || &block[0..4] != b"INDX" {
            continue;
        }
        let mut block = block.to_vec();
        let usa_offset = u16::from_le_bytes([block[4], block[5]]) as usize;
        let usa_count = u16::from_le_bytes([block[6], block[7]]);
        if usa_offset + (usa_count as usize) * 2 > block.len() {
            continue;
        }
        let fixup_result = Fixup::get_fixup(&block[usa_offset..], usa_count);
        let fixup = match fixup_result {
            Ok((_, result)) => result,
            Err(_err) => continue,
        };
        if fixup.apply_fixup(&mut block).is_err() {
            warn!("[ntfs] Bad fixup in a $SII block, skipping");
            continue;
        }

        let node_offset = 24;
        let entries_offset =
            u32::from_le_bytes([block[24], block[25], block[26], block[27]]) as usize;
        let total_size =
            u32::from_le_bytes([block[28], block[29], block[30], block[31]]) as usize;
        let start = node_offset + entries_offset;
        let end = std::cmp::min(node_offset + total_size, block.len());
        if start >= end {
            continue;
        }
        collect_sii_entries(&block[start..end], &mut entries);
    }

    Ok(entries)
}

/// Walk fixed-format $SII entries until the end sentinel
fn collect_sii_entries(data: &[u8], entries: &mut Vec<SiiEntry>) {
    let mut remaining = data;
    let header_size = 16;

    while remaining.len() >= header_size {
        let parse_result = parse_sii_entry(remaining);
        let (entry_size, flags, entry) = match parse_result {
            Ok(result) => result,
            Err(_err) => break,
        };
        let last = 0x2;
        if (flags & last) == last {
            break;
        }
        if let Some(entry) = entry {
            entries.push(entry);
        }
        if entry_size < header_size as u16 || entry_size as usize > remaining.len() {
            break;
        }
        remaining = &remaining[entry_size as usize..];
    }
}

type SiiParse = (u16, u16, Option<SiiEntry>);

fn parse_sii_entry(data: &[u8]) -> Result<SiiParse, nom::Err<nom::error::Error<&[u8]>>> {
    let (input, _data_offset) = nom_unsigned_two_bytes(data, Endian::Le)?;
    let (input, _data_size) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, _padding) = nom_unsigned_four_bytes(input, Endian::Le)?;
    let (input, entry_size) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, key_size) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, flags) = nom_unsigned_two_bytes(input, Endian::Le)?;
    let (input, _padding) = nom_unsigned_two_bytes(input, Endian::Le)?;

    let key_and_data = 24;
    if key_size != 4 || input.len() < key_and_data {
        return Ok((entry_size, flags, None));
    }

    let (input, security_id) = nom_unsigned_four_bytes(input, Endian::Le)?;
    let (input, hash) = nom_unsigned_four_bytes(input, Endian::Le)?;
    let (input, data_security_id) = nom_unsigned_four_bytes(input, Endian::Le)?;
    let (input, sds_offset) = nom_unsigned_eight_bytes(input, Endian::Le)?;
    let (_, sds_size) = nom_unsigned_four_bytes(input, Endian::Le)?;

    if security_id != data_security_id {
        warn!("[ntfs] $SII key {security_id} disagrees with its data {data_security_id}");
    }

    let entry = SiiEntry {
        security_id,
        hash,
        sds_offset,
        sds_size,
    };
    Ok((entry_size, flags, Some(entry)))
}

/// Read one SECURITY_DESCRIPTOR_ENTRY out of $SDS and validate its header
/// against the $SII row that pointed at it
fn read_descriptor(
    reader: &mut dyn VolumeReader,
    stream: &mut DataStream<'_>,
    entry: &SiiEntry,
) -> Result<SecurityDescriptorInfo, NtfsError> {
    let header_size = 20;
    if entry.sds_size < header_size {
        return Err(NtfsError::Truncated);
    }

    stream.seek(entry.sds_offset as i64, Whence::Start)?;
    let mut data = vec![0u8; entry.sds_size as usize];
    let mut read = 0;
    while read < data.len() {
        let bytes = stream.read(reader, &mut data[read..])?;
        if bytes == 0 {
            return Err(NtfsError::Truncated);
        }
        read += bytes;
    }

    fn parse_entry(input: &[u8]) -> nom::IResult<&[u8], (u32, u32, u64, u32, &[u8])> {
        let header_size = 20;
        let (input, hash) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, security_id) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let (input, offset) = nom_unsigned_eight_bytes(input, Endian::Le)?;
        let (input, size) = nom_unsigned_four_bytes(input, Endian::Le)?;
        let descriptor_size = (size as u64).saturating_sub(header_size as u64);
        let take_size = std::cmp::min(descriptor_size, input.len() as u64);
        let (input, descriptor) = nom_data(input, take_size)?;
        Ok((input, (hash, security_id, offset, size, descriptor)))
    }
    let parsed: nom::IResult<&[u8], (u32, u32, u64, u32, &[u8])> = parse_entry(&data);

    let (_, (hash, security_id, offset, _size, descriptor)) = match parsed {
        Ok(result) => result,
        Err(_err) => return Err(NtfsError::Truncated),
    };

    if security_id != entry.security_id || offset != entry.sds_offset {
        warn!(
            "[ntfs] $SDS entry at {} does not match its $SII row (id {} vs {})",
            entry.sds_offset, security_id, entry.security_id
        );
    }

    Ok(SecurityDescriptorInfo {
        security_id: entry.security_id,
        hash,
        sds_offset: entry.sds_offset,
        size: entry.sds_size,
        descriptor: descriptor.to_vec(),
    })
}
