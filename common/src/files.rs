use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub md5: bool,
    pub sha1: bool,
    pub sha256: bool,
}

impl Hashes {
    /// Check if any hash algorithm is selected
    pub fn any(&self) -> bool {
        self.md5 || self.sha1 || self.sha256
    }

    /// Union two hash selections
    pub fn merge(&mut self, other: &Hashes) {
        self.md5 |= other.md5;
        self.sha1 |= other.sha1;
        self.sha256 |= other.sha256;
    }
}

#[cfg(test)]
mod tests {
    use super::Hashes;

    #[test]
    fn test_merge() {
        let mut hashes = Hashes {
            md5: true,
            sha1: false,
            sha256: false,
        };
        hashes.merge(&Hashes {
            md5: false,
            sha1: false,
            sha256: true,
        });

        assert_eq!(hashes.md5, true);
        assert_eq!(hashes.sha1, false);
        assert_eq!(hashes.sha256, true);
        assert_eq!(hashes.any(), true);
    }
}
