//! Builders for synthetic MFT images used by the integration testers. The
//! images double as the volume: records live at index * 1024, cluster
//! payloads anywhere past the record area.
#![allow(dead_code)]

pub const BYTES_PER_FRS: usize = 1024;
pub const CLUSTER_SIZE: usize = 4096;

pub const FLAG_IN_USE: u16 = 0x1;
pub const FLAG_DIRECTORY: u16 = 0x2;

/// Build one fixed-up 1024-byte file record
pub fn build_record(
    index: u64,
    sequence: u16,
    flags: u16,
    base: Option<(u64, u16)>,
    attrs: &[Vec<u8>],
) -> Vec<u8> {
    let mut record = vec![0u8; BYTES_PER_FRS];
    record[0..4].copy_from_slice(b"FILE");
    record[4..6].copy_from_slice(&48u16.to_le_bytes()); // usa offset
    record[6..8].copy_from_slice(&3u16.to_le_bytes()); // usa count
    record[16..18].copy_from_slice(&sequence.to_le_bytes());
    record[18..20].copy_from_slice(&1u16.to_le_bytes()); // link count
    record[20..22].copy_from_slice(&56u16.to_le_bytes()); // first attribute
    record[22..24].copy_from_slice(&flags.to_le_bytes());
    if let Some((base_index, base_sequence)) = base {
        record[32..36].copy_from_slice(&(base_index as u32).to_le_bytes());
        record[36..38].copy_from_slice(&((base_index >> 32) as u16).to_le_bytes());
        record[38..40].copy_from_slice(&base_sequence.to_le_bytes());
    }
    record[40..42].copy_from_slice(&10u16.to_le_bytes()); // next attribute id
    record[44..48].copy_from_slice(&(index as u32).to_le_bytes());

    let mut offset = 56;
    for attr in attrs {
        record[offset..offset + attr.len()].copy_from_slice(attr);
        offset += attr.len();
    }
    record[offset..offset + 4].copy_from_slice(&0xffffffffu32.to_le_bytes());
    offset += 8;
    record[24..28].copy_from_slice(&(offset as u32).to_le_bytes());
    record[28..32].copy_from_slice(&(BYTES_PER_FRS as u32).to_le_bytes());

    apply_fixup(&mut record, 48);
    record
}

/// Stamp the update sequence number into each sector tail, keeping the
/// originals in the update sequence array
pub fn apply_fixup(block: &mut [u8], usa_offset: usize) {
    let usn: u16 = 0x1;
    block[usa_offset..usa_offset + 2].copy_from_slice(&usn.to_le_bytes());
    let sectors = block.len() / 512;
    for sector in 0..sectors {
        let end = (sector + 1) * 512;
        let usa_slot = usa_offset + 2 + sector * 2;
        let original = [block[end - 2], block[end - 1]];
        block[usa_slot..usa_slot + 2].copy_from_slice(&original);
        block[end - 2..end].copy_from_slice(&usn.to_le_bytes());
    }
}

fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// Resident attribute with optional name
pub fn resident_attr(type_code: u32, name: &str, value: &[u8], instance: u16) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let name_offset = 24;
    let value_offset = align8(name_offset + name_units.len() * 2);
    let size = align8(value_offset + value.len());

    let mut attr = vec![0u8; size];
    attr[0..4].copy_from_slice(&type_code.to_le_bytes());
    attr[4..8].copy_from_slice(&(size as u32).to_le_bytes());
    attr[8] = 0; // resident
    attr[9] = name_units.len() as u8;
    attr[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    attr[14..16].copy_from_slice(&instance.to_le_bytes());
    attr[16..20].copy_from_slice(&(value.len() as u32).to_le_bytes());
    attr[20..22].copy_from_slice(&(value_offset as u16).to_le_bytes());

    let mut cursor = name_offset;
    for unit in name_units {
        attr[cursor..cursor + 2].copy_from_slice(&unit.to_le_bytes());
        cursor += 2;
    }
    attr[value_offset..value_offset + value.len()].copy_from_slice(value);
    attr
}

/// Non-resident attribute over an explicit run list
pub fn non_resident_attr(
    type_code: u32,
    name: &str,
    runs: &[u8],
    last_vcn: u64,
    allocated: u64,
    data_size: u64,
    instance: u16,
) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let name_offset = 64;
    let run_offset = align8(name_offset + name_units.len() * 2);
    let size = align8(run_offset + runs.len() + 1);

    let mut attr = vec![0u8; size];
    attr[0..4].copy_from_slice(&type_code.to_le_bytes());
    attr[4..8].copy_from_slice(&(size as u32).to_le_bytes());
    attr[8] = 1; // non-resident
    attr[9] = name_units.len() as u8;
    attr[10..12].copy_from_slice(&(name_offset as u16).to_le_bytes());
    attr[14..16].copy_from_slice(&instance.to_le_bytes());
    attr[16..24].copy_from_slice(&0u64.to_le_bytes()); // first vcn
    attr[24..32].copy_from_slice(&last_vcn.to_le_bytes());
    attr[32..34].copy_from_slice(&(run_offset as u16).to_le_bytes());
    // compression unit zero
    attr[40..48].copy_from_slice(&allocated.to_le_bytes());
    attr[48..56].copy_from_slice(&data_size.to_le_bytes());
    attr[56..64].copy_from_slice(&data_size.to_le_bytes()); // valid

    let mut cursor = name_offset;
    for unit in name_units {
        attr[cursor..cursor + 2].copy_from_slice(&unit.to_le_bytes());
        cursor += 2;
    }
    attr[run_offset..run_offset + runs.len()].copy_from_slice(runs);
    attr
}

/// $STANDARD_INFORMATION value (72 bytes)
pub fn standard_info_value(timestamp: u64, file_attributes: u32) -> Vec<u8> {
    let mut value = vec![0u8; 72];
    for slot in 0..4 {
        value[slot * 8..slot * 8 + 8].copy_from_slice(&timestamp.to_le_bytes());
    }
    value[32..36].copy_from_slice(&file_attributes.to_le_bytes());
    value[52..56].copy_from_slice(&257u32.to_le_bytes()); // security id
    value
}

/// $FILE_NAME value
pub fn file_name_value(
    parent_index: u64,
    parent_sequence: u16,
    name: &str,
    file_attributes: u32,
    size: u64,
) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let mut value = vec![0u8; 66 + name_units.len() * 2];
    value[0..4].copy_from_slice(&(parent_index as u32).to_le_bytes());
    value[4..6].copy_from_slice(&((parent_index >> 32) as u16).to_le_bytes());
    value[6..8].copy_from_slice(&parent_sequence.to_le_bytes());
    let timestamp = 132244766174460000u64;
    for slot in 0..4 {
        value[8 + slot * 8..16 + slot * 8].copy_from_slice(&timestamp.to_le_bytes());
    }
    value[40..48].copy_from_slice(&size.to_le_bytes()); // allocated
    value[48..56].copy_from_slice(&size.to_le_bytes());
    value[56..60].copy_from_slice(&file_attributes.to_le_bytes());
    value[64] = name_units.len() as u8;
    value[65] = 1; // Windows namespace
    let mut cursor = 66;
    for unit in name_units {
        value[cursor..cursor + 2].copy_from_slice(&unit.to_le_bytes());
        cursor += 2;
    }
    value
}

/// Empty $INDEX_ROOT value for a $I30 index: root header, node header, and
/// a single end entry. Directory membership hangs off this attribute
pub fn index_root_value() -> Vec<u8> {
    let mut value = Vec::new();
    value.extend_from_slice(&0x30u32.to_le_bytes()); // indexed type
    value.extend_from_slice(&1u32.to_le_bytes()); // collation filename
    value.extend_from_slice(&(CLUSTER_SIZE as u32).to_le_bytes());
    value.extend_from_slice(&1u32.to_le_bytes());
    // Node header: entries at 16, one end entry
    value.extend_from_slice(&16u32.to_le_bytes());
    value.extend_from_slice(&32u32.to_le_bytes());
    value.extend_from_slice(&32u32.to_le_bytes());
    value.extend_from_slice(&0u32.to_le_bytes());
    // End entry
    value.extend_from_slice(&0u64.to_le_bytes());
    value.extend_from_slice(&16u16.to_le_bytes());
    value.extend_from_slice(&0u16.to_le_bytes());
    value.extend_from_slice(&2u16.to_le_bytes());
    value.extend_from_slice(&0u16.to_le_bytes());
    value
}

/// One $ATTRIBUTE_LIST row
pub fn attribute_list_entry(
    type_code: u32,
    name: &str,
    target_index: u64,
    target_sequence: u16,
    instance: u16,
) -> Vec<u8> {
    let name_units: Vec<u16> = name.encode_utf16().collect();
    let name_offset = 26;
    let length = align8(name_offset + name_units.len() * 2);

    let mut entry = vec![0u8; length];
    entry[0..4].copy_from_slice(&type_code.to_le_bytes());
    entry[4..6].copy_from_slice(&(length as u16).to_le_bytes());
    entry[6] = name_units.len() as u8;
    entry[7] = name_offset as u8;
    entry[16..20].copy_from_slice(&(target_index as u32).to_le_bytes());
    entry[20..22].copy_from_slice(&((target_index >> 32) as u16).to_le_bytes());
    entry[22..24].copy_from_slice(&target_sequence.to_le_bytes());
    entry[24..26].copy_from_slice(&instance.to_le_bytes());
    let mut cursor = name_offset;
    for unit in name_units {
        entry[cursor..cursor + 2].copy_from_slice(&unit.to_le_bytes());
        cursor += 2;
    }
    entry
}

/// Single-run run list: `clusters` at `lcn`
pub fn run_list(lcn: u64, clusters: u64) -> Vec<u8> {
    let mut runs = Vec::new();
    runs.push(0x31); // 1 length byte, 3 offset bytes
    runs.push(clusters as u8);
    runs.extend_from_slice(&lcn.to_le_bytes()[0..3]);
    runs.push(0);
    runs
}

/// Sparse run list: `clusters` with no backing storage
pub fn sparse_run_list(clusters: u64) -> Vec<u8> {
    vec![0x02, clusters as u8, (clusters >> 8) as u8, 0]
}

/// Assemble an image from (index, record) pairs, padded to `total_size`
pub fn build_image(records: &[(u64, Vec<u8>)], record_count: u64, total_size: usize) -> Vec<u8> {
    let minimum = (record_count as usize) * BYTES_PER_FRS;
    let mut image = vec![0u8; std::cmp::max(minimum, total_size)];
    for (index, record) in records {
        let offset = (*index as usize) * BYTES_PER_FRS;
        image[offset..offset + record.len()].copy_from_slice(record);
    }
    image
}

/// Root directory record (segment 5)
pub fn root_record() -> Vec<u8> {
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0), 0);
    let file_name = resident_attr(0x30, "", &file_name_value(5, 5, ".", 0x10000000, 0), 1);
    let index_root = resident_attr(0x90, "$I30", &index_root_value(), 2);
    build_record(
        5,
        5,
        FLAG_IN_USE | FLAG_DIRECTORY,
        None,
        &[standard, file_name, index_root],
    )
}

/// Plain directory record
pub fn directory_record(index: u64, sequence: u16, parent: u64, parent_seq: u16, name: &str) -> Vec<u8> {
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0), 0);
    let file_name = resident_attr(
        0x30,
        "",
        &file_name_value(parent, parent_seq, name, 0x10000000, 0),
        1,
    );
    let index_root = resident_attr(0x90, "$I30", &index_root_value(), 2);
    build_record(
        index,
        sequence,
        FLAG_IN_USE | FLAG_DIRECTORY,
        None,
        &[standard, file_name, index_root],
    )
}

/// Plain file record with one resident unnamed $DATA
pub fn file_record(
    index: u64,
    sequence: u16,
    parent: u64,
    parent_seq: u16,
    name: &str,
    content: &[u8],
) -> Vec<u8> {
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0);
    let file_name = resident_attr(
        0x30,
        "",
        &file_name_value(parent, parent_seq, name, 0x20, content.len() as u64),
        1,
    );
    let data = resident_attr(0x80, "", content, 2);
    build_record(index, sequence, FLAG_IN_USE, None, &[standard, file_name, data])
}
