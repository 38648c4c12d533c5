use serde::Deserialize;

/// What part of a volume a walk covers and how aggressively it digs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationSet {
    /// Sub-tree root paths. Empty means the whole volume
    #[serde(default)]
    pub sub_dirs: Vec<String>,
    /// Keep records whose in-use flag is cleared (deleted files)
    #[serde(default)]
    pub include_not_in_use: bool,
    /// Deliver directory index entries ($I30) including slack carving
    #[serde(default)]
    pub parse_i30: bool,
    /// Parse the structure of $INDEX_ALLOCATION blocks whose bitmap bit is
    /// clear instead of only carving them
    #[serde(default)]
    pub parse_unallocated_indx: bool,
    /// Computer name stamped on matches
    #[serde(default)]
    pub computer: String,
}

impl LocationSet {
    /// Normalize sub-tree roots: backslash separators, one trailing
    /// backslash, drop a lone root. Mirrors how the walk expands configured
    /// locations before prefix tests
    pub fn normalized_roots(&self) -> Vec<String> {
        let mut roots = Vec::new();
        for dir in &self.sub_dirs {
            let mut root = dir.replace('/', "\\");
            if !root.starts_with('\\') {
                root.insert(0, '\\');
            }
            if !root.ends_with('\\') {
                root.push('\\');
            }
            if root != "\\" {
                roots.push(root);
            }
        }
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::LocationSet;

    #[test]
    fn test_normalized_roots() {
        let locations = LocationSet {
            sub_dirs: vec![
                String::from("\\Windows\\System32"),
                String::from("/Users/bob/"),
                String::from("\\"),
            ],
            ..Default::default()
        };
        let roots = locations.normalized_roots();
        assert_eq!(
            roots,
            vec![
                String::from("\\Windows\\System32\\"),
                String::from("\\Users\\bob\\"),
            ]
        );
    }
}
