use super::{
    attributes::{
        data::DataAttribute,
        filename::{FileName, Namespace},
        index::{parse_i30_entries, I30Entry, IndexRoot},
    },
    error::NtfsError,
    fixup::Fixup,
    record::{AttributeValue, MftAttribute},
    segment::{SafeSegmentNumber, SegmentReference},
    stream::{read_all, DataStream},
};
use crate::filesystem::volume::VolumeReader;
use log::warn;

/// One name delivered from a directory index: the entry, and whether it was
/// carved out of slack instead of walked from the live tree
#[derive(Debug, Clone)]
pub struct I30Emission {
    pub entry: I30Entry,
    pub carved: bool,
}

/// Walk a directory's $I30 structures: resident $INDEX_ROOT entries, each
/// allocated $INDEX_ALLOCATION block alongside the $BITMAP, and the slack
/// bytes inside every block for carved names
pub(crate) fn walk_i30(
    reader: &mut dyn VolumeReader,
    cluster_size: u32,
    attributes: &[&MftAttribute],
    directory: SafeSegmentNumber,
    parse_unallocated: bool,
) -> Result<Vec<I30Emission>, NtfsError> {
    let mut emissions = Vec::new();

    let root = find_index_root(attributes);
    let allocation = find_i30_stream(attributes, true);
    let bitmap = find_i30_stream(attributes, false);

    let root = match root {
        Some(result) => result,
        None => return Ok(emissions),
    };

    // Live entries straight out of the resident root
    for entry in parse_i30_entries(&root.entries_data) {
        if entry.file_name.is_some() {
            emissions.push(I30Emission {
                entry,
                carved: false,
            });
        }
    }

    let allocation = match allocation {
        Some(result) => result,
        None => return Ok(emissions),
    };

    let block_size = root.bytes_per_index as usize;
    if block_size == 0 {
        return Ok(emissions);
    }

    let bitmap_bytes = match bitmap {
        Some(stream) => read_all(reader, cluster_size, stream)?,
        None => Vec::new(),
    };

    let allocation_size = allocation.size();
    let block_count = (allocation_size as usize) / block_size;
    let mut stream = DataStream::new(allocation, cluster_size);
    let mut block = vec![0u8; block_size];

    for block_index in 0..block_count {
        stream.seek(
            (block_index * block_size) as i64,
            super::stream::Whence::Start,
        )?;
        let bytes = stream.read(reader, &mut block)?;
        if bytes < block_size {
            warn!("[ntfs] Short read of $I30 block {block_index}");
            break;
        }

        let allocated = bitmap_bit(&bitmap_bytes, block_index);
        if allocated {
            emissions.append(&mut walk_block(&mut block, directory)?);
        } else if parse_unallocated {
            // Toggle: trust the structure of a freed block anyway. Whatever
            // it yields is still reported as carved
            let walked = walk_block(&mut block, directory);
            match walked {
                Ok(block_emissions) => {
                    emissions.extend(block_emissions.into_iter().map(|emission| I30Emission {
                        entry: emission.entry,
                        carved: true,
                    }));
                }
                Err(err) => {
                    warn!("[ntfs] Freed $I30 block {block_index} did not parse: {err:?}");
                }
            }
        } else {
            // Bitmap says free: never parse structured, best-effort carve only
            emissions.extend(
                carve_region(&block, directory)
                    .into_iter()
                    .map(|entry| I30Emission {
                        entry,
                        carved: true,
                    }),
            );
        }
    }

    Ok(emissions)
}

/// Fixup one INDX block, walk its live entries, then carve its slack
fn walk_block(
    block: &mut [u8],
    directory: SafeSegmentNumber,
) -> Result<Vec<I30Emission>, NtfsError> {
    let mut emissions = Vec::new();

    let indx_sig = b"INDX";
    if block.len() < 40 || &block[0..4] != indx_sig {
        warn!("[ntfs] $I30 block without INDX signature, carving only");
        emissions.extend(carve_region(block, directory).into_iter().map(|entry| {
            I30Emission {
                entry,
                carved: true,
            }
        }));
        return Ok(emissions);
    }

    let usa_offset = u16::from_le_bytes([block[4], block[5]]) as usize;
    let usa_count = u16::from_le_bytes([block[6], block[7]]);
    if usa_offset + (usa_count as usize) * 2 > block.len() {
        return Err(NtfsError::Truncated);
    }
    let fixup_result = Fixup::get_fixup(&block[usa_offset..], usa_count);
    let fixup = match fixup_result {
        Ok((_, result)) => result,
        Err(_err) => return Err(NtfsError::Truncated),
    };
    fixup.apply_fixup(block)?;

    // Node header sits after the 24-byte INDX header
    let node_offset = 24;
    let entries_offset =
        u32::from_le_bytes([block[24], block[25], block[26], block[27]]) as usize;
    let total_size = u32::from_le_bytes([block[28], block[29], block[30], block[31]]) as usize;

    let entries_start = node_offset + entries_offset;
    let entries_end = std::cmp::min(node_offset + total_size, block.len());
    if entries_start >= block.len() || entries_start > entries_end {
        return Err(NtfsError::Truncated);
    }

    for entry in parse_i30_entries(&block[entries_start..entries_end]) {
        if entry.file_name.is_some() {
            emissions.push(I30Emission {
                entry,
                carved: false,
            });
        }
    }

    // Slack space after the last live entry
    if entries_end < block.len() {
        emissions.extend(
            carve_region(&block[entries_end..], directory)
                .into_iter()
                .map(|entry| I30Emission {
                    entry,
                    carved: true,
                }),
        );
    }

    Ok(emissions)
}

/// Scan raw bytes for FILE_NAME structures whose parent reference matches
/// the directory being walked
fn carve_region(data: &[u8], directory: SafeSegmentNumber) -> Vec<I30Entry> {
    let mut entries = Vec::new();
    let needle = SegmentReference {
        segment_low: directory.index as u32,
        segment_high: (directory.index >> 32) as u16,
        sequence: directory.sequence,
    }
    .to_bytes();

    let min_filename = 66;
    let mut offset = 0;
    while offset + min_filename <= data.len() {
        let found = data[offset..]
            .windows(needle.len())
            .position(|window| window == needle.as_slice());
        let hit = match found {
            Some(result) => offset + result,
            None => break,
        };

        if let Some(entry) = carve_candidate(data, hit) {
            entries.push(entry);
            // Jump past the carved name to avoid re-hitting inside it
            offset = hit + min_filename;
            continue;
        }
        offset = hit + 1;
    }

    entries
}

/// Try to read a FILE_NAME at `offset`. The index-entry header precedes the
/// name, so the referenced record number sits 16 bytes earlier when present
fn carve_candidate(data: &[u8], offset: usize) -> Option<I30Entry> {
    let candidate = &data[offset..];
    let parse_result = FileName::parse_filename(candidate);
    let file_name = match parse_result {
        Ok((_, result)) => result,
        Err(_err) => return None,
    };

    if file_name.name_size == 0
        || file_name.namespace == Namespace::Unknown
        || file_name.name.is_empty()
        || file_name.name.contains('\u{0}')
    {
        return None;
    }

    let entry_header = 16;
    let reference = if offset >= entry_header {
        let start = offset - entry_header;
        let reference_bytes = &data[start..start + 8];
        match SegmentReference::parse(reference_bytes) {
            Ok((_, result)) => result,
            Err(_err) => return None,
        }
    } else {
        SegmentReference {
            segment_low: 0,
            segment_high: 0,
            sequence: 0,
        }
    };

    Some(I30Entry {
        reference,
        entry_length: 0,
        key_length: 66 + file_name.name_size as u16 * 2,
        flags: 0,
        file_name: Some(file_name),
    })
}

fn find_index_root<'a>(attributes: &[&'a MftAttribute]) -> Option<&'a IndexRoot> {
    attributes.iter().find_map(|attr| match &attr.value {
        AttributeValue::IndexRoot(root) if attr.name() == "$I30" => Some(root),
        _ => None,
    })
}

fn find_i30_stream<'a>(
    attributes: &[&'a MftAttribute],
    allocation: bool,
) -> Option<&'a DataAttribute> {
    attributes.iter().find_map(|attr| {
        if attr.name() != "$I30" {
            return None;
        }
        match &attr.value {
            AttributeValue::IndexAllocation(stream) if allocation => Some(stream),
            AttributeValue::Bitmap(stream) if !allocation => Some(stream),
            _ => None,
        }
    })
}

fn bitmap_bit(bitmap: &[u8], index: usize) -> bool {
    let byte = index / 8;
    if byte >= bitmap.len() {
        // Without a readable bitmap the block is assumed live
        return true;
    }
    (bitmap[byte] >> (index % 8)) & 1 == 1
}
