use log::error;
use serde::Deserialize;
use std::fmt;

/// One declarative rule as it appears in the configuration document. Which
/// criteria are active follows from which fields are present
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleConfig {
    /// Free-form name: classified as exact, glob, or regex, and split on
    /// `:` (ADS) or `#` (EA)
    pub name: Option<String>,
    pub name_exact: Option<String>,
    pub name_match: Option<String>,
    pub name_regex: Option<String>,
    pub path_exact: Option<String>,
    pub path_match: Option<String>,
    pub path_regex: Option<String>,
    pub ads_exact: Option<String>,
    pub ads_match: Option<String>,
    pub ads_regex: Option<String>,
    pub ea_exact: Option<String>,
    pub ea_match: Option<String>,
    pub ea_regex: Option<String>,
    pub attr_name_exact: Option<String>,
    pub attr_name_match: Option<String>,
    pub attr_name_regex: Option<String>,
    pub attr_type: Option<u32>,
    pub size: Option<u64>,
    pub size_gt: Option<u64>,
    pub size_ge: Option<u64>,
    pub size_lt: Option<u64>,
    pub size_le: Option<u64>,
    pub md5: Option<String>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    /// Plain byte substring of the data stream
    pub contains: Option<String>,
    /// Hex-encoded byte substring
    pub contains_hex: Option<String>,
    /// Literal header bytes at offset zero
    pub header: Option<String>,
    pub header_hex: Option<String>,
    /// Regex over the first `header_len` bytes
    pub header_regex: Option<String>,
    pub header_len: Option<u64>,
    /// Named content-scan rules evaluated by the injected scanner
    #[serde(default)]
    pub rules: Vec<String>,
    pub description: Option<String>,
}

/// The whole rule document: inclusion terms and exclusion terms
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub include: Vec<RuleConfig>,
    #[serde(default)]
    pub exclude: Vec<RuleConfig>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RuleFileError {
    BadToml,
}

impl std::error::Error for RuleFileError {}

impl fmt::Display for RuleFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleFileError::BadToml => write!(f, "Failed to parse rule TOML"),
        }
    }
}

impl RuleFile {
    /// Parse a TOML rule document
    pub fn parse_rules(data: &str) -> Result<RuleFile, RuleFileError> {
        let rules_result = toml::from_str(data);
        match rules_result {
            Ok(result) => Ok(result),
            Err(err) => {
                error!("[filefind] Could not parse rule document: {err:?}");
                Err(RuleFileError::BadToml)
            }
        }
    }
}
