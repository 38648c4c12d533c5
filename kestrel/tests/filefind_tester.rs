mod testdata;

use kestrel::filefind::engine::FileFind;
use kestrel::filefind::render::{match_to_row, match_to_tree};
use kestrel::filesystem::volume::BufferReader;
use kestrel::ntfs::source::OfflineMftSource;
use kestrel::ntfs::walker::MftWalker;
use kestrel::structs::locations::LocationSet;
use kestrel::structs::rules::RuleFile;
use simplelog::{Config, LevelFilter, SimpleLogger};
use testdata::{
    apply_fixup, build_image, build_record, directory_record, file_name_value, file_record,
    non_resident_attr, resident_attr, root_record, run_list, sparse_run_list,
    standard_info_value, BYTES_PER_FRS, CLUSTER_SIZE, FLAG_DIRECTORY, FLAG_IN_USE,
};

fn run_engine(
    image: Vec<u8>,
    record_count: u64,
    rules: &str,
    options: &LocationSet,
) -> Vec<common::windows::FileMatch> {
    let _ = SimpleLogger::init(LevelFilter::Warn, Config::default());
    let reader = BufferReader::new(image, BYTES_PER_FRS as u32, CLUSTER_SIZE as u32)
        .with_serial(0x1122334455667788);
    let source = OfflineMftSource::new(record_count);
    let mut walker = MftWalker::new(Box::new(reader), Box::new(source), options);

    let rule_file = RuleFile::parse_rules(rules).unwrap();
    let mut engine = FileFind::new("WORKSTATION");
    let rejected = engine.add_rules(&rule_file);
    assert_eq!(rejected, 0);

    walker.walk(&mut engine).unwrap();
    engine.take_matches()
}

fn base_tree() -> Vec<(u64, Vec<u8>)> {
    vec![
        (5, root_record()),
        (64, directory_record(64, 1, 5, 5, "Windows")),
        (65, directory_record(65, 1, 64, 1, "System32")),
        (66, directory_record(66, 1, 64, 1, "SysWOW64")),
        (67, directory_record(67, 1, 5, 5, "Users")),
        (68, directory_record(68, 1, 67, 1, "bob")),
        (69, directory_record(69, 1, 67, 1, "alice")),
    ]
}

#[test]
fn test_exact_name_include_with_hashes() {
    let mut records = base_tree();
    // Two notepad.exe with empty default streams, hashes are the known
    // empty-input digests
    records.push((70, file_record(70, 1, 65, 1, "notepad.exe", b"")));
    records.push((71, file_record(71, 1, 66, 1, "notepad.exe", b"")));
    records.push((72, file_record(72, 1, 65, 1, "calc.exe", b"")));
    let image = build_image(&records, 73, 0);

    let rules = r#"
[[include]]
name = "notepad.exe"
md5 = "d41d8cd98f00b204e9800998ecf8427e"
sha1 = "da39a3ee5e6b4b0d3255bfef95601890afd80709"
sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
"#;
    let matches = run_engine(image, 73, rules, &LocationSet::default());

    assert_eq!(matches.len(), 2);
    let mut paths: Vec<String> = matches
        .iter()
        .map(|hit| hit.names[0].full_path.clone())
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            String::from("\\Windows\\System32\\notepad.exe"),
            String::from("\\Windows\\SysWOW64\\notepad.exe"),
        ]
    );
    for hit in &matches {
        assert_eq!(matches[0].rule, hit.rule);
        assert_eq!(hit.attributes[0].md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            hit.attributes[0].sha1,
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        assert_eq!(
            hit.attributes[0].sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(hit.volume_serial, 0x1122334455667788);
        assert_eq!(hit.computer, "WORKSTATION");
    }

    // Render sanity: flat row and structured tree carry the path
    let row = match_to_row(&matches[0]);
    assert_eq!(row.len(), 19);
    assert!(row[2].ends_with("notepad.exe"));
    let tree = match_to_tree(&matches[0]);
    assert_eq!(tree["record"]["computer"], "WORKSTATION");
}

#[test]
fn test_size_range_with_ads_regex() {
    let mut records = base_tree();

    // Large sparse unnamed stream plus a Zone.Identifier ADS
    let size: u64 = 1500000;
    let clusters = size.div_ceil(CLUSTER_SIZE as u64);
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0);
    let name_attr = resident_attr(
        0x30,
        "",
        &file_name_value(68, 1, "download.dat", 0x20, size),
        1,
    );
    let data = non_resident_attr(
        0x80,
        "",
        &sparse_run_list(clusters),
        clusters - 1,
        clusters * CLUSTER_SIZE as u64,
        size,
        2,
    );
    let ads = resident_attr(0x80, "Zone.Identifier", b"[ZoneTransfer]\r\nZoneId=3", 3);
    records.push((
        80,
        build_record(80, 1, FLAG_IN_USE, None, &[standard, name_attr, data, ads]),
    ));

    // Small file with the same ADS: fails the size bound
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0);
    let name_attr = resident_attr(
        0x30,
        "",
        &file_name_value(68, 1, "small.dat", 0x20, 10),
        1,
    );
    let data = resident_attr(0x80, "", b"small data", 2);
    let ads = resident_attr(0x80, "Zone.Identifier", b"[ZoneTransfer]\r\nZoneId=3", 3);
    records.push((
        81,
        build_record(81, 1, FLAG_IN_USE, None, &[standard, name_attr, data, ads]),
    ));

    // Large file without the ADS
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0);
    let name_attr = resident_attr(
        0x30,
        "",
        &file_name_value(68, 1, "big.bin", 0x20, size),
        1,
    );
    let data = non_resident_attr(
        0x80,
        "",
        &sparse_run_list(clusters),
        clusters - 1,
        clusters * CLUSTER_SIZE as u64,
        size,
        2,
    );
    records.push((
        82,
        build_record(82, 1, FLAG_IN_USE, None, &[standard, name_attr, data]),
    ));

    let image = build_image(&records, 83, 0);
    let rules = r#"
[[include]]
size_gt = 1000000
ads_regex = ".*Zone\\.Identifier"
"#;
    let matches = run_engine(image, 83, rules, &LocationSet::default());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].names[0].full_path, "\\Users\\bob\\download.dat");
    assert_eq!(matches[0].size, 1500000);
    // The matching attribute is the named stream
    assert_eq!(matches[0].attributes.len(), 1);
    assert_eq!(matches[0].attributes[0].name, "Zone.Identifier");
}

#[test]
fn test_exclusion_wins() {
    let mut records = base_tree();
    records.push((80, file_record(80, 1, 68, 1, "evil.exe", b"payload bytes")));
    // Benign installer with the empty-input SHA-256
    records.push((81, file_record(81, 1, 69, 1, "setup.exe", b"")));
    let image = build_image(&records, 82, 0);

    let rules = r#"
[[include]]
path_match = '\Users\*\*.exe'

[[exclude]]
sha256 = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
"#;
    let matches = run_engine(image, 82, rules, &LocationSet::default());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].names[0].full_path, "\\Users\\bob\\evil.exe");
    // Demanded hash was computed for the surviving match too
    assert_eq!(matches[0].attributes[0].sha256.len(), 64);
    assert_ne!(
        matches[0].attributes[0].sha256,
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_deleted_record_match() {
    let mut records = base_tree();
    records.push((
        90,
        build_record(
            90,
            4,
            0, // in-use cleared
            None,
            &[
                resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0),
                resident_attr(0x30, "", &file_name_value(60, 1, "gone.txt", 0x20, 4), 1),
                resident_attr(0x80, "", b"gone", 2),
            ],
        ),
    ));
    let image = build_image(&records, 91, 0);

    let rules = r#"
[[include]]
name = "gone.txt"
"#;
    let options = LocationSet {
        include_not_in_use: true,
        ..Default::default()
    };
    let matches = run_engine(image, 91, rules, &options);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].deleted, true);
    // Parent directory was never recoverable: placeholder in the path
    assert!(matches[0].names[0].full_path.contains("__"));
}

#[test]
fn test_header_regex() {
    let mut records = base_tree();

    let mut pe_image = vec![0u8; 512];
    pe_image[0..2].copy_from_slice(b"MZ");
    pe_image[60..62].copy_from_slice(b"PE");
    records.push((80, file_record(80, 1, 65, 1, "loader.bin", &pe_image)));

    let mut other = vec![0u8; 512];
    other[0..2].copy_from_slice(b"ZM");
    records.push((81, file_record(81, 1, 65, 1, "other.bin", &other)));
    let image = build_image(&records, 82, 0);

    let rules = r#"
[[include]]
header_regex = "^MZ.{58}PE"
header_len = 512
"#;
    let matches = run_engine(image, 82, rules, &LocationSet::default());

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].names[0].full_path, "\\Windows\\System32\\loader.bin");
    assert_eq!(matches[0].attributes.len(), 1);
}

#[test]
fn test_contains_substring() {
    let mut records = base_tree();
    records.push((
        80,
        file_record(80, 1, 68, 1, "notes.txt", b"the quick brown fox jumps"),
    ));
    records.push((81, file_record(81, 1, 68, 1, "plain.txt", b"nothing here")));
    let image = build_image(&records, 82, 0);

    let rules = r#"
[[include]]
contains = "brown fox"
"#;
    let matches = run_engine(image, 82, rules, &LocationSet::default());
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].names[0].file_name, "notes.txt");
}

#[test]
fn test_carved_i30_entry() {
    let mut records = base_tree();

    // Directory 30 whose live index no longer lists secret.log
    let mut root_value = Vec::new();
    root_value.extend_from_slice(&0x30u32.to_le_bytes());
    root_value.extend_from_slice(&1u32.to_le_bytes()); // collation filename
    root_value.extend_from_slice(&(CLUSTER_SIZE as u32).to_le_bytes());
    root_value.extend_from_slice(&1u32.to_le_bytes());
    // Node header: entries at 16, one end entry
    root_value.extend_from_slice(&16u32.to_le_bytes());
    root_value.extend_from_slice(&32u32.to_le_bytes());
    root_value.extend_from_slice(&32u32.to_le_bytes());
    root_value.extend_from_slice(&1u32.to_le_bytes());
    // End entry
    root_value.extend_from_slice(&0u64.to_le_bytes());
    root_value.extend_from_slice(&16u16.to_le_bytes());
    root_value.extend_from_slice(&0u16.to_le_bytes());
    root_value.extend_from_slice(&2u16.to_le_bytes());
    root_value.extend_from_slice(&0u16.to_le_bytes());

    let allocation_lcn = 48;
    let standard = resident_attr(0x10, "", &standard_info_value(132244766174460000, 0), 0);
    let name_attr = resident_attr(
        0x30,
        "",
        &file_name_value(5, 5, "staging", 0x10000000, 0),
        1,
    );
    let index_root = resident_attr(0x90, "$I30", &root_value, 2);
    let allocation = non_resident_attr(
        0xa0,
        "$I30",
        &run_list(allocation_lcn, 1),
        0,
        CLUSTER_SIZE as u64,
        CLUSTER_SIZE as u64,
        3,
    );
    let bitmap = resident_attr(0xb0, "$I30", &[0x01, 0, 0, 0, 0, 0, 0, 0], 4);
    records.push((
        30,
        build_record(
            30,
            1,
            FLAG_IN_USE | FLAG_DIRECTORY,
            None,
            &[standard, name_attr, index_root, allocation, bitmap],
        ),
    ));

    // INDX block: one end entry, then slack holding the deleted name
    let mut block = vec![0u8; CLUSTER_SIZE];
    block[0..4].copy_from_slice(b"INDX");
    block[4..6].copy_from_slice(&40u16.to_le_bytes()); // usa offset
    block[6..8].copy_from_slice(&9u16.to_le_bytes()); // usa count
    // Node header at 24: entries at 40 (relative), 56 bytes used
    block[24..28].copy_from_slice(&40u32.to_le_bytes());
    block[28..32].copy_from_slice(&56u32.to_le_bytes());
    block[32..36].copy_from_slice(&((CLUSTER_SIZE - 24) as u32).to_le_bytes());
    // End entry at 64
    block[72..74].copy_from_slice(&16u16.to_le_bytes());
    block[76..78].copy_from_slice(&2u16.to_le_bytes());
    // Slack: index-entry remnant at 120, FILE_NAME key at 136
    let entry_ref: u64 = (2u64 << 48) | 200;
    block[120..128].copy_from_slice(&entry_ref.to_le_bytes());
    let secret = file_name_value(30, 1, "secret.log", 0x20, 699);
    block[136..136 + secret.len()].copy_from_slice(&secret);
    apply_fixup(&mut block, 40);

    let record_area = 31 * BYTES_PER_FRS;
    let total = (allocation_lcn as usize + 1) * CLUSTER_SIZE;
    let mut image = build_image(&records, 31, total);
    assert!(record_area <= allocation_lcn as usize * CLUSTER_SIZE);
    let offset = allocation_lcn as usize * CLUSTER_SIZE;
    image[offset..offset + CLUSTER_SIZE].copy_from_slice(&block);

    let rules = r#"
[[include]]
name = "secret.log"
"#;
    let options = LocationSet {
        parse_i30: true,
        ..Default::default()
    };
    let matches = run_engine(image, 31, rules, &options);

    let carved: Vec<_> = matches
        .iter()
        .filter(|hit| hit.i30.as_ref().map(|entry| entry.carved).unwrap_or(false))
        .collect();
    assert_eq!(carved.len(), 1);
    assert_eq!(carved[0].names[0].file_name, "secret.log");
    assert_eq!(carved[0].names[0].full_path, "\\staging\\secret.log");
    assert_eq!(carved[0].frn & 0xffff_ffff_ffff, 200);
    assert_eq!(carved[0].deleted, true);
}

#[test]
fn test_include_and_exclude_same_name() {
    let mut records = base_tree();
    records.push((80, file_record(80, 1, 68, 1, "tool.exe", b"tool")));
    let image = build_image(&records, 81, 0);

    // Include and exclude both hit: the exclusion always wins
    let rules = r#"
[[include]]
name = "tool.exe"

[[exclude]]
name = "tool.exe"
"#;
    let matches = run_engine(image, 81, rules, &LocationSet::default());
    assert_eq!(matches.len(), 0);
}
