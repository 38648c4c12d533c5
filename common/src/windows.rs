use serde::{Deserialize, Serialize};

/// One positive rule evaluation for one MFT record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMatch {
    pub computer: String,
    pub volume_serial: u64,
    /// Snapshot GUID when the volume is a VSS snapshot
    pub snapshot_id: String,
    /// Safe segment number of the matched record (index + sequence)
    pub frn: u64,
    pub parent_frn: u64,
    pub size: u64,
    /// Description of the rule that matched
    pub rule: String,
    /// Every matching (file name, full path) pairing
    pub names: Vec<NameMatch>,
    /// Every matching data attribute with demanded hashes filled in
    pub attributes: Vec<AttributeMatch>,
    pub standard_information: Option<StandardInfoSnapshot>,
    pub filename_times: Option<FileNameTimes>,
    pub deleted: bool,
    /// Set when the match came from a directory index entry instead of a record
    pub i30: Option<I30EntryInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameMatch {
    pub file_name: String,
    pub full_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMatch {
    pub attr_type: u32,
    pub instance: u16,
    pub name: String,
    pub size: u64,
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    /// Names of content-scan rules that fired on this stream
    pub matched_rules: Vec<String>,
}

/// $STANDARD_INFORMATION timestamps and flags as found on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardInfoSnapshot {
    pub created: String,
    pub modified: String,
    pub accessed: String,
    pub changed: String,
    pub file_attributes: u32,
    pub usn: u64,
    pub security_id: u32,
}

/// $FILE_NAME timestamps (set at rename/creation, useful against timestomping)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNameTimes {
    pub created: String,
    pub modified: String,
    pub accessed: String,
    pub changed: String,
}

/// One entry recovered from a directory index ($I30)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I30EntryInfo {
    pub parent_frn: u64,
    pub carved: bool,
}

/// One security descriptor recovered from $Secure ($SII + $SDS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityDescriptorInfo {
    pub security_id: u32,
    pub hash: u32,
    pub sds_offset: u64,
    pub size: u32,
    pub descriptor: Vec<u8>,
}
