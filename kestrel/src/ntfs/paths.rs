use super::{attributes::filename::FileName, segment::SafeSegmentNumber};
use crate::utils::strings::caseless_starts_with;
use log::warn;
use std::collections::{HashMap, HashSet};

/// Location-membership tristate. Monotonic: once decided it is never
/// revisited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InLocation {
    Yes,
    No,
    Unknown,
}

/// Cached canonical name of one directory, keyed by safe segment number.
/// Lives for the whole walk so late records can still resolve their parents
#[derive(Debug, Clone)]
pub(crate) struct DirectoryName {
    pub(crate) parent: SafeSegmentNumber,
    pub(crate) name: String,
    pub(crate) in_location: InLocation,
}

/// One resolved (file name, path) pairing handed to callbacks
#[derive(Debug, Clone)]
pub struct ResolvedName {
    /// Position in the record's file-name attribute list
    pub name_index: usize,
    pub file_name: String,
    pub full_path: String,
    pub in_location: bool,
    /// Path contains a `__<hex>__` placeholder for a missing ancestor
    pub placeholder: bool,
    pub parent: SafeSegmentNumber,
}

#[derive(Debug, Default)]
pub(crate) struct DirectoryNames {
    names: HashMap<u64, DirectoryName>,
}

impl DirectoryNames {
    pub(crate) fn new() -> DirectoryNames {
        DirectoryNames {
            names: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, segment: SafeSegmentNumber, parent: SafeSegmentNumber, name: String) {
        self.names.entry(segment.as_u64()).or_insert(DirectoryName {
            parent,
            name,
            in_location: InLocation::Unknown,
        });
    }

    /// Exact match first; a sequence one higher covers a parent that was
    /// deleted after the child's name was written
    pub(crate) fn lookup(&self, segment: SafeSegmentNumber) -> Option<&DirectoryName> {
        let exact = self.names.get(&segment.as_u64());
        if exact.is_some() {
            return exact;
        }
        let bumped = SafeSegmentNumber::new(segment.index, segment.sequence.wrapping_add(1));
        self.names.get(&bumped.as_u64())
    }

    fn lookup_key(&self, segment: SafeSegmentNumber) -> Option<u64> {
        if self.names.contains_key(&segment.as_u64()) {
            return Some(segment.as_u64());
        }
        let bumped = SafeSegmentNumber::new(segment.index, segment.sequence.wrapping_add(1));
        if self.names.contains_key(&bumped.as_u64()) {
            return Some(bumped.as_u64());
        }
        None
    }

    /// Build the canonical full path for one $FILE_NAME, walking the parent
    /// chain up to the volume root. A missing parent splices in a
    /// `\__<16-hex-segment>__\` placeholder and stops the climb
    pub(crate) fn full_name(
        &self,
        file_name: &FileName,
        root: SafeSegmentNumber,
        stream_suffix: Option<&str>,
    ) -> (String, bool) {
        let mut components: Vec<String> = Vec::new();
        let mut placeholder = false;

        let mut current = file_name.parent.to_safe();
        let mut visited: HashSet<u64> = HashSet::new();
        loop {
            if current.index == root.index {
                break;
            }
            if !visited.insert(current.index) {
                warn!("[ntfs] Parent cycle at segment {current}, stopping path climb");
                placeholder = true;
                components.push(format!("__{:016x}__", current.as_u64()));
                break;
            }
            match self.lookup(current) {
                Some(directory) => {
                    components.push(directory.name.clone());
                    current = directory.parent;
                }
                None => {
                    placeholder = true;
                    components.push(format!("__{:016x}__", current.as_u64()));
                    break;
                }
            }
        }

        // Assembled right to left
        let mut path = String::new();
        for component in components.iter().rev() {
            path.push('\\');
            path.push_str(component);
        }
        path.push('\\');
        path.push_str(&file_name.name);
        if let Some(suffix) = stream_suffix {
            path.push_str(suffix);
        }

        (path, placeholder)
    }

    /// Test sub-tree membership of a built path, memoizing the verdict on
    /// the direct parent. Roots are expanded prefixes ending in `\`
    pub(crate) fn in_location(
        &mut self,
        file_name: &FileName,
        full_path: &str,
        locations: &[String],
    ) -> bool {
        if locations.is_empty() {
            return true;
        }

        let parent = file_name.parent.to_safe();
        let parent_key = self.lookup_key(parent);
        if let Some(key) = parent_key {
            if let Some(directory) = self.names.get(&key) {
                match directory.in_location {
                    InLocation::Yes => return true,
                    InLocation::No => return false,
                    InLocation::Unknown => {}
                }
            }
        }

        let in_location = locations
            .iter()
            .any(|location| caseless_starts_with(full_path, location));

        // Decide the parent when the whole sub-tree below it must agree:
        // the parent path itself is inside a root (all children in), or no
        // root can ever extend below it (all children out)
        if let Some(key) = parent_key {
            let parent_path_end = full_path.rfind('\\').unwrap_or(0);
            let parent_path = format!("{}\\", &full_path[..parent_path_end]);
            let verdict = if locations
                .iter()
                .any(|location| caseless_starts_with(&parent_path, location))
            {
                InLocation::Yes
            } else if locations
                .iter()
                .all(|location| !caseless_starts_with(location, &parent_path))
            {
                InLocation::No
            } else {
                InLocation::Unknown
            };
            if verdict != InLocation::Unknown {
                if let Some(directory) = self.names.get_mut(&key) {
                    if directory.in_location == InLocation::Unknown {
                        directory.in_location = verdict;
                    }
                }
            }
        }

        in_location
    }
}

#[cfg(test)]
mod tests {
    use super::DirectoryNames;
    use crate::ntfs::attributes::filename::{FileName, Namespace};
    use crate::ntfs::segment::{SafeSegmentNumber, SegmentReference};

    fn file_name(name: &str, parent_index: u64, parent_seq: u16) -> FileName {
        FileName {
            parent: SegmentReference {
                segment_low: parent_index as u32,
                segment_high: (parent_index >> 32) as u16,
                sequence: parent_seq,
            },
            created: 0,
            modified: 0,
            changed: 0,
            accessed: 0,
            allocated_size: 0,
            size: 0,
            file_attributes: 0,
            extended_data: 0,
            name_size: name.len() as u8,
            namespace: Namespace::Windows,
            name: name.to_string(),
        }
    }

    fn root() -> SafeSegmentNumber {
        SafeSegmentNumber::new(5, 5)
    }

    #[test]
    fn test_full_name() {
        let mut dirs = DirectoryNames::new();
        dirs.insert(
            SafeSegmentNumber::new(100, 1),
            root(),
            String::from("Windows"),
        );
        dirs.insert(
            SafeSegmentNumber::new(101, 1),
            SafeSegmentNumber::new(100, 1),
            String::from("System32"),
        );

        let name = file_name("notepad.exe", 101, 1);
        let (path, placeholder) = dirs.full_name(&name, root(), None);
        assert_eq!(path, "\\Windows\\System32\\notepad.exe");
        assert_eq!(placeholder, false);
    }

    #[test]
    fn test_full_name_missing_parent() {
        let dirs = DirectoryNames::new();
        let name = file_name("gone.txt", 200, 3);
        let (path, placeholder) = dirs.full_name(&name, root(), None);
        assert_eq!(path, format!("\\__{:016x}__\\gone.txt", (3u64 << 48) | 200));
        assert_eq!(placeholder, true);
    }

    #[test]
    fn test_full_name_stream_suffix() {
        let dirs = DirectoryNames::new();
        let name = file_name("file.txt", 5, 5);
        let (path, _) = dirs.full_name(&name, root(), Some(":Zone.Identifier"));
        assert_eq!(path, "\\file.txt:Zone.Identifier");
    }

    #[test]
    fn test_long_path_growth() {
        let mut dirs = DirectoryNames::new();
        let component = "a".repeat(200);
        let mut parent = root();
        for index in 0..64 {
            let segment = SafeSegmentNumber::new(1000 + index, 1);
            dirs.insert(segment, parent, component.clone());
            parent = segment;
        }

        let name = file_name("deep.txt", 1063, 1);
        let (path, placeholder) = dirs.full_name(&name, root(), None);
        assert_eq!(placeholder, false);
        assert_eq!(path.len(), 64 * 201 + 1 + 8);
        assert!(path.ends_with("\\deep.txt"));
        assert!(path.starts_with(&format!("\\{component}\\")));
    }

    #[test]
    fn test_in_location() {
        let mut dirs = DirectoryNames::new();
        dirs.insert(
            SafeSegmentNumber::new(100, 1),
            root(),
            String::from("Windows"),
        );

        let locations = vec![String::from("\\windows\\")];
        let name = file_name("explorer.exe", 100, 1);
        let (path, _) = dirs.full_name(&name, root(), None);
        assert_eq!(dirs.in_location(&name, &path, &locations), true);

        // Memoized on the direct parent
        let again = file_name("other.exe", 100, 1);
        let (path, _) = dirs.full_name(&again, root(), None);
        assert_eq!(dirs.in_location(&again, &path, &locations), true);

        let outside = file_name("file.txt", 5, 5);
        let (path, _) = dirs.full_name(&outside, root(), None);
        assert_eq!(dirs.in_location(&outside, &path, &locations), false);
    }

    #[test]
    fn test_in_location_empty() {
        let mut dirs = DirectoryNames::new();
        let name = file_name("any.txt", 5, 5);
        assert_eq!(dirs.in_location(&name, "\\any.txt", &[]), true);
    }

    #[test]
    fn test_deleted_parent_sequence_bump() {
        let mut dirs = DirectoryNames::new();
        // Directory record was reused: cache carries sequence 4, the child
        // still references sequence 3
        dirs.insert(SafeSegmentNumber::new(60, 4), root(), String::from("tmp"));

        let name = file_name("gone.txt", 60, 3);
        let (path, placeholder) = dirs.full_name(&name, root(), None);
        assert_eq!(path, "\\tmp\\gone.txt");
        assert_eq!(placeholder, false);
    }
}
