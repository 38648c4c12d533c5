mod testdata;

use kestrel::filesystem::volume::BufferReader;
use kestrel::ntfs::error::NtfsError;
use kestrel::ntfs::source::OfflineMftSource;
use kestrel::ntfs::stream::DataStream;
use kestrel::ntfs::walker::{MftWalker, RecordView, RecordVisitor, VisitContext, WalkControl};
use kestrel::structs::locations::LocationSet;
use simplelog::{Config, LevelFilter, SimpleLogger};
use testdata::{
    attribute_list_entry, build_image, build_record, directory_record, file_name_value,
    file_record, resident_attr, root_record, standard_info_value, BYTES_PER_FRS, CLUSTER_SIZE,
    FLAG_IN_USE,
};

/// Collects every dispatched record with its resolved paths and data
#[derive(Default)]
struct Collector {
    elements: Vec<CollectedRecord>,
    stop_at_first: bool,
    saw_progress: bool,
}

struct CollectedRecord {
    frn_index: u64,
    deleted: bool,
    paths: Vec<String>,
    data_streams: Vec<(String, Vec<u8>)>,
}

impl RecordVisitor for Collector {
    fn element(
        &mut self,
        ctx: &mut VisitContext<'_>,
        view: &RecordView<'_>,
    ) -> Result<(), NtfsError> {
        let mut data_streams = Vec::new();
        for attr in view.data_attributes() {
            let data = match attr.data() {
                Some(result) => result,
                None => continue,
            };
            let mut stream = DataStream::new(data, ctx.volume.cluster_size);
            let mut content = vec![0u8; stream.size() as usize];
            let mut filled = 0;
            while filled < content.len() {
                let bytes = stream.read(ctx.reader, &mut content[filled..])?;
                if bytes == 0 {
                    break;
                }
                filled += bytes;
            }
            data_streams.push((data.name.clone(), content));
        }

        self.elements.push(CollectedRecord {
            frn_index: view.record.segment.index,
            deleted: view.deleted,
            paths: view.names.iter().map(|name| name.full_path.clone()).collect(),
            data_streams,
        });
        Ok(())
    }

    fn progress(&mut self, _percent: u8) -> WalkControl {
        self.saw_progress = true;
        if self.stop_at_first && !self.elements.is_empty() {
            return WalkControl::Stop;
        }
        WalkControl::Continue
    }
}

fn walk_image(image: Vec<u8>, record_count: u64, options: &LocationSet) -> Collector {
    let _ = SimpleLogger::init(LevelFilter::Warn, Config::default());
    let reader = BufferReader::new(image, BYTES_PER_FRS as u32, CLUSTER_SIZE as u32);
    let source = OfflineMftSource::new(record_count);
    let mut walker = MftWalker::new(Box::new(reader), Box::new(source), options);
    let mut collector = Collector::default();
    walker.walk(&mut collector).unwrap();
    collector
}

fn standard_tree() -> Vec<(u64, Vec<u8>)> {
    vec![
        (5, root_record()),
        (64, directory_record(64, 1, 5, 5, "Windows")),
        (65, directory_record(65, 1, 64, 1, "System32")),
        (66, file_record(66, 1, 65, 1, "notepad.exe", b"MZ-NOTEPAD")),
    ]
}

#[test]
fn test_walk_resolves_full_paths() {
    let image = build_image(&standard_tree(), 67, 0);
    let collector = walk_image(image, 67, &LocationSet::default());

    let notepad = collector
        .elements
        .iter()
        .find(|record| record.frn_index == 66)
        .unwrap();
    assert_eq!(notepad.paths, vec!["\\Windows\\System32\\notepad.exe"]);
    assert_eq!(notepad.deleted, false);
    assert_eq!(notepad.data_streams.len(), 1);
    assert_eq!(notepad.data_streams[0].1, b"MZ-NOTEPAD");
    assert!(collector.saw_progress);
}

#[test]
fn test_walk_file_before_parents() {
    // The file's record index is lower than its parent directories', so its
    // bytes arrive first and completeness repair has to fetch the parents
    let records = vec![
        (5, root_record()),
        (30, file_record(30, 1, 65, 1, "early.bin", b"early")),
        (64, directory_record(64, 1, 5, 5, "Windows")),
        (65, directory_record(65, 1, 64, 1, "System32")),
    ];
    let image = build_image(&records, 66, 0);
    let collector = walk_image(image, 66, &LocationSet::default());

    let early = collector
        .elements
        .iter()
        .find(|record| record.frn_index == 30)
        .unwrap();
    assert_eq!(early.paths, vec!["\\Windows\\System32\\early.bin"]);
}

#[test]
fn test_walk_twice_is_deterministic() {
    let image = build_image(&standard_tree(), 67, 0);
    let first = walk_image(image.clone(), 67, &LocationSet::default());
    let second = walk_image(image, 67, &LocationSet::default());

    let mut first_paths: Vec<String> = first
        .elements
        .iter()
        .flat_map(|record| record.paths.clone())
        .collect();
    let mut second_paths: Vec<String> = second
        .elements
        .iter()
        .flat_map(|record| record.paths.clone())
        .collect();
    first_paths.sort();
    second_paths.sort();
    assert_eq!(first_paths, second_paths);
}

#[test]
fn test_deleted_record_with_missing_parent() {
    let mut records = standard_tree();
    // Deleted file whose parent directory is gone entirely
    records.push((
        80,
        build_record(
            80,
            3,
            0, // in-use cleared
            None,
            &[
                resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0),
                resident_attr(0x30, "", &file_name_value(60, 1, "gone.txt", 0x20, 10), 1),
            ],
        ),
    ));
    let image = build_image(&records, 81, 0);

    // Without the opt-in the record never reaches callbacks
    let collector = walk_image(image.clone(), 81, &LocationSet::default());
    assert!(collector
        .elements
        .iter()
        .all(|record| record.frn_index != 80));

    let options = LocationSet {
        include_not_in_use: true,
        ..Default::default()
    };
    let collector = walk_image(image, 81, &options);
    let gone = collector
        .elements
        .iter()
        .find(|record| record.frn_index == 80)
        .unwrap();
    assert_eq!(gone.deleted, true);
    assert_eq!(gone.paths.len(), 1);
    assert!(gone.paths[0].contains("__"));
    assert!(gone.paths[0].ends_with("\\gone.txt"));
}

#[test]
fn test_attribute_list_child_record() {
    let mut records = standard_tree();

    // Base record 70 lists its $DATA as living in child record 71
    let list_value: Vec<u8> = [
        attribute_list_entry(0x10, "", 70, 2, 0),
        attribute_list_entry(0x30, "", 70, 2, 1),
        attribute_list_entry(0x80, "", 71, 1, 2),
    ]
    .concat();
    let base = build_record(
        70,
        2,
        FLAG_IN_USE,
        None,
        &[
            resident_attr(0x10, "", &standard_info_value(132244766174460000, 0x20), 0),
            resident_attr(0x30, "", &file_name_value(64, 1, "split.bin", 0x20, 12), 1),
            resident_attr(0x20, "", &list_value, 9),
        ],
    );
    let child = build_record(
        71,
        1,
        FLAG_IN_USE,
        Some((70, 2)),
        &[resident_attr(0x80, "", b"childpayload", 2)],
    );
    records.push((70, base));
    records.push((71, child));
    let image = build_image(&records, 72, 0);
    let collector = walk_image(image, 72, &LocationSet::default());

    let split = collector
        .elements
        .iter()
        .find(|record| record.frn_index == 70)
        .unwrap();
    assert_eq!(split.paths, vec!["\\Windows\\split.bin"]);
    // The child's $DATA shows up in the merged view
    assert_eq!(split.data_streams.len(), 1);
    assert_eq!(split.data_streams[0].1, b"childpayload");

    // The child record is never dispatched on its own
    assert!(collector
        .elements
        .iter()
        .all(|record| record.frn_index != 71));
}

#[test]
fn test_sub_tree_roots_restrict_callbacks() {
    let mut records = standard_tree();
    records.push((67, directory_record(67, 1, 5, 5, "Users")));
    records.push((68, file_record(68, 1, 67, 1, "out.txt", b"outside")));
    let image = build_image(&records, 69, 0);

    let options = LocationSet {
        sub_dirs: vec![String::from("\\Windows")],
        ..Default::default()
    };
    let collector = walk_image(image, 69, &options);

    assert!(collector
        .elements
        .iter()
        .any(|record| record.frn_index == 66));
    assert!(collector
        .elements
        .iter()
        .all(|record| record.frn_index != 68));
}

#[test]
fn test_progress_stop() {
    let image = build_image(&standard_tree(), 67, 0);
    let reader = BufferReader::new(image, BYTES_PER_FRS as u32, CLUSTER_SIZE as u32);
    let source = OfflineMftSource::new(67);
    let mut walker = MftWalker::new(
        Box::new(reader),
        Box::new(source),
        &LocationSet::default(),
    );
    let mut collector = Collector {
        stop_at_first: true,
        ..Default::default()
    };
    let result = walker.walk(&mut collector);
    assert_eq!(result.unwrap_err(), NtfsError::StopRequested);
}
