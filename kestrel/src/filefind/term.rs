use super::error::RuleError;
use crate::structs::rules::RuleConfig;
use crate::utils::{regex_options::create_caseless_regex, strings::caseless_eq};
use glob::{MatchOptions, Pattern};
use log::error;
use regex::Regex;

/// One rule criterion. A term matches only when every required criterion
/// matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criteria {
    NameExact,
    NameMatch,
    NameRegex,
    PathExact,
    PathMatch,
    PathRegex,
    AdsExact,
    AdsMatch,
    AdsRegex,
    EaExact,
    EaMatch,
    EaRegex,
    AttrNameExact,
    AttrNameMatch,
    AttrNameRegex,
    AttrType,
    SizeEq,
    SizeGt,
    SizeGe,
    SizeLt,
    SizeLe,
    DataMd5,
    DataSha1,
    DataSha256,
    Contains,
    Header,
    HeaderRegex,
    RuleScan,
}

/// How a free-form pattern should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Exact,
    Glob,
    Regex,
}

/// Windows name comparisons ignore ASCII case, globs follow suit
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// One compiled rule
#[derive(Debug, Clone)]
pub struct SearchTerm {
    pub required: Vec<Criteria>,
    pub description: String,
    pub(crate) name_exact: Option<String>,
    pub(crate) name_glob: Option<Pattern>,
    pub(crate) name_regex: Option<Regex>,
    pub(crate) path_exact: Option<String>,
    pub(crate) path_glob: Option<Pattern>,
    pub(crate) path_regex: Option<Regex>,
    pub(crate) ads_exact: Option<String>,
    pub(crate) ads_glob: Option<Pattern>,
    pub(crate) ads_regex: Option<Regex>,
    pub(crate) ea_exact: Option<String>,
    pub(crate) ea_glob: Option<Pattern>,
    pub(crate) ea_regex: Option<Regex>,
    pub(crate) attr_exact: Option<String>,
    pub(crate) attr_glob: Option<Pattern>,
    pub(crate) attr_regex: Option<Regex>,
    pub(crate) attr_type: Option<u32>,
    pub(crate) size_eq: Option<u64>,
    pub(crate) size_gt: Option<u64>,
    pub(crate) size_ge: Option<u64>,
    pub(crate) size_lt: Option<u64>,
    pub(crate) size_le: Option<u64>,
    pub(crate) md5: Option<String>,
    pub(crate) sha1: Option<String>,
    pub(crate) sha256: Option<String>,
    pub(crate) contains: Option<Vec<u8>>,
    pub(crate) header: Option<Vec<u8>>,
    pub(crate) header_regex: Option<regex::bytes::Regex>,
    pub(crate) header_len: usize,
    pub(crate) scan_rules: Vec<String>,
}

impl SearchTerm {
    /// Compile one configured rule into a term. Invalid combinations and
    /// uncompilable patterns reject the rule
    pub fn from_config(config: &RuleConfig) -> Result<SearchTerm, RuleError> {
        validate_combinations(config)?;

        let mut term = SearchTerm {
            required: Vec::new(),
            description: String::new(),
            name_exact: None,
            name_glob: None,
            name_regex: None,
            path_exact: None,
            path_glob: None,
            path_regex: None,
            ads_exact: None,
            ads_glob: None,
            ads_regex: None,
            ea_exact: None,
            ea_glob: None,
            ea_regex: None,
            attr_exact: None,
            attr_glob: None,
            attr_regex: None,
            attr_type: None,
            size_eq: None,
            size_gt: None,
            size_ge: None,
            size_lt: None,
            size_le: None,
            md5: None,
            sha1: None,
            sha256: None,
            contains: None,
            header: None,
            header_regex: None,
            header_len: 0,
            scan_rules: Vec::new(),
        };

        if let Some(name) = &config.name {
            term.apply_free_form(name)?;
        }

        term.apply_name(
            config.name_exact.as_deref(),
            config.name_match.as_deref(),
            config.name_regex.as_deref(),
        )?;
        term.apply_path(
            config.path_exact.as_deref(),
            config.path_match.as_deref(),
            config.path_regex.as_deref(),
        )?;
        term.apply_ads(
            config.ads_exact.as_deref(),
            config.ads_match.as_deref(),
            config.ads_regex.as_deref(),
        )?;
        term.apply_ea(
            config.ea_exact.as_deref(),
            config.ea_match.as_deref(),
            config.ea_regex.as_deref(),
        )?;
        term.apply_attr_name(
            config.attr_name_exact.as_deref(),
            config.attr_name_match.as_deref(),
            config.attr_name_regex.as_deref(),
        )?;

        if let Some(code) = config.attr_type {
            term.attr_type = Some(code);
            term.required.push(Criteria::AttrType);
        }

        if let Some(size) = config.size {
            term.size_eq = Some(size);
            term.required.push(Criteria::SizeEq);
        }
        if let Some(size) = config.size_gt {
            term.size_gt = Some(size);
            term.required.push(Criteria::SizeGt);
        }
        if let Some(size) = config.size_ge {
            term.size_ge = Some(size);
            term.required.push(Criteria::SizeGe);
        }
        if let Some(size) = config.size_lt {
            term.size_lt = Some(size);
            term.required.push(Criteria::SizeLt);
        }
        if let Some(size) = config.size_le {
            term.size_le = Some(size);
            term.required.push(Criteria::SizeLe);
        }

        if let Some(value) = &config.md5 {
            term.md5 = Some(validate_hash(value, 32)?);
            term.required.push(Criteria::DataMd5);
        }
        if let Some(value) = &config.sha1 {
            term.sha1 = Some(validate_hash(value, 40)?);
            term.required.push(Criteria::DataSha1);
        }
        if let Some(value) = &config.sha256 {
            term.sha256 = Some(validate_hash(value, 64)?);
            term.required.push(Criteria::DataSha256);
        }

        if let Some(value) = &config.contains {
            term.contains = Some(value.as_bytes().to_vec());
            term.required.push(Criteria::Contains);
        }
        if let Some(value) = &config.contains_hex {
            term.contains = Some(decode_hex(value)?);
            term.required.push(Criteria::Contains);
        }

        if let Some(value) = &config.header {
            let header = value.as_bytes().to_vec();
            term.header_len = header.len();
            term.header = Some(header);
            term.required.push(Criteria::Header);
        }
        if let Some(value) = &config.header_hex {
            let header = decode_hex(value)?;
            term.header_len = header.len();
            term.header = Some(header);
            term.required.push(Criteria::Header);
        }
        if let Some(value) = &config.header_regex {
            let length = match config.header_len {
                Some(result) => result as usize,
                None => {
                    error!("[filefind] header_regex requires header_len");
                    return Err(RuleError::InvalidRule);
                }
            };
            let regex_result = regex::bytes::RegexBuilder::new(value)
                .unicode(false)
                .dot_matches_new_line(true)
                .build();
            let regex = match regex_result {
                Ok(result) => result,
                Err(err) => {
                    error!("[filefind] Bad header regex {value}: {err:?}");
                    return Err(RuleError::BadRegex);
                }
            };
            term.header_len = length;
            term.header_regex = Some(regex);
            term.required.push(Criteria::HeaderRegex);
        }

        if !config.rules.is_empty() {
            term.scan_rules = config.rules.clone();
            term.required.push(Criteria::RuleScan);
        }

        if term.required.is_empty() {
            error!("[filefind] Rule carries no criteria");
            return Err(RuleError::InvalidRule);
        }

        term.description = match &config.description {
            Some(result) => result.clone(),
            None => term.synthesize_description(config),
        };

        Ok(term)
    }

    /// Classify a free-form name and split off an ADS (`:`) or EA (`#`)
    /// suffix, reclassifying each side
    fn apply_free_form(&mut self, value: &str) -> Result<(), RuleError> {
        if let Some((name, ea)) = value.split_once('#') {
            self.apply_classified_name(name)?;
            self.apply_classified_ea(ea)?;
            return Ok(());
        }
        if let Some((name, ads)) = value.split_once(':') {
            self.apply_classified_name(name)?;
            self.apply_classified_ads(ads)?;
            return Ok(());
        }
        self.apply_classified_name(value)
    }

    fn apply_classified_name(&mut self, value: &str) -> Result<(), RuleError> {
        if value.is_empty() {
            return Ok(());
        }
        match discriminate(value) {
            PatternKind::Exact => self.apply_name(Some(value), None, None),
            PatternKind::Glob => self.apply_name(None, Some(value), None),
            PatternKind::Regex => self.apply_name(None, None, Some(value)),
        }
    }

    fn apply_classified_ads(&mut self, value: &str) -> Result<(), RuleError> {
        if value.is_empty() {
            return Ok(());
        }
        match discriminate(value) {
            PatternKind::Exact => self.apply_ads(Some(value), None, None),
            PatternKind::Glob => self.apply_ads(None, Some(value), None),
            PatternKind::Regex => self.apply_ads(None, None, Some(value)),
        }
    }

    fn apply_classified_ea(&mut self, value: &str) -> Result<(), RuleError> {
        if value.is_empty() {
            return Ok(());
        }
        match discriminate(value) {
            PatternKind::Exact => self.apply_ea(Some(value), None, None),
            PatternKind::Glob => self.apply_ea(None, Some(value), None),
            PatternKind::Regex => self.apply_ea(None, None, Some(value)),
        }
    }

    fn apply_name(
        &mut self,
        exact: Option<&str>,
        glob: Option<&str>,
        regex: Option<&str>,
    ) -> Result<(), RuleError> {
        if let Some(value) = exact {
            self.name_exact = Some(value.to_string());
            self.required.push(Criteria::NameExact);
        }
        if let Some(value) = glob {
            self.name_glob = Some(compile_glob(value)?);
            self.required.push(Criteria::NameMatch);
        }
        if let Some(value) = regex {
            self.name_regex = Some(compile_regex(value)?);
            self.required.push(Criteria::NameRegex);
        }
        Ok(())
    }

    fn apply_path(
        &mut self,
        exact: Option<&str>,
        glob: Option<&str>,
        regex: Option<&str>,
    ) -> Result<(), RuleError> {
        if let Some(value) = exact {
            self.path_exact = Some(value.to_string());
            self.required.push(Criteria::PathExact);
        }
        if let Some(value) = glob {
            self.path_glob = Some(compile_glob(value)?);
            self.required.push(Criteria::PathMatch);
        }
        if let Some(value) = regex {
            self.path_regex = Some(compile_regex(value)?);
            self.required.push(Criteria::PathRegex);
        }
        Ok(())
    }

    fn apply_ads(
        &mut self,
        exact: Option<&str>,
        glob: Option<&str>,
        regex: Option<&str>,
    ) -> Result<(), RuleError> {
        if let Some(value) = exact {
            self.ads_exact = Some(value.to_string());
            self.required.push(Criteria::AdsExact);
        }
        if let Some(value) = glob {
            self.ads_glob = Some(compile_glob(value)?);
            self.required.push(Criteria::AdsMatch);
        }
        if let Some(value) = regex {
            self.ads_regex = Some(compile_regex(value)?);
            self.required.push(Criteria::AdsRegex);
        }
        Ok(())
    }

    fn apply_ea(
        &mut self,
        exact: Option<&str>,
        glob: Option<&str>,
        regex: Option<&str>,
    ) -> Result<(), RuleError> {
        if let Some(value) = exact {
            self.ea_exact = Some(value.to_string());
            self.required.push(Criteria::EaExact);
        }
        if let Some(value) = glob {
            self.ea_glob = Some(compile_glob(value)?);
            self.required.push(Criteria::EaMatch);
        }
        if let Some(value) = regex {
            self.ea_regex = Some(compile_regex(value)?);
            self.required.push(Criteria::EaRegex);
        }
        Ok(())
    }

    fn apply_attr_name(
        &mut self,
        exact: Option<&str>,
        glob: Option<&str>,
        regex: Option<&str>,
    ) -> Result<(), RuleError> {
        if let Some(value) = exact {
            self.attr_exact = Some(value.to_string());
            self.required.push(Criteria::AttrNameExact);
        }
        if let Some(value) = glob {
            self.attr_glob = Some(compile_glob(value)?);
            self.required.push(Criteria::AttrNameMatch);
        }
        if let Some(value) = regex {
            self.attr_regex = Some(compile_regex(value)?);
            self.required.push(Criteria::AttrNameRegex);
        }
        Ok(())
    }

    pub fn requires(&self, criteria: Criteria) -> bool {
        self.required.contains(&criteria)
    }

    pub(crate) fn has_name_criteria(&self) -> bool {
        self.requires(Criteria::NameExact)
            || self.requires(Criteria::NameMatch)
            || self.requires(Criteria::NameRegex)
    }

    pub(crate) fn has_path_criteria(&self) -> bool {
        self.requires(Criteria::PathExact)
            || self.requires(Criteria::PathMatch)
            || self.requires(Criteria::PathRegex)
    }

    pub(crate) fn has_ads_criteria(&self) -> bool {
        self.requires(Criteria::AdsExact)
            || self.requires(Criteria::AdsMatch)
            || self.requires(Criteria::AdsRegex)
    }

    pub(crate) fn has_ea_criteria(&self) -> bool {
        self.requires(Criteria::EaExact)
            || self.requires(Criteria::EaMatch)
            || self.requires(Criteria::EaRegex)
    }

    pub(crate) fn has_attr_criteria(&self) -> bool {
        self.requires(Criteria::AttrNameExact)
            || self.requires(Criteria::AttrNameMatch)
            || self.requires(Criteria::AttrNameRegex)
            || self.requires(Criteria::AttrType)
    }

    pub(crate) fn has_size_criteria(&self) -> bool {
        self.size_eq.is_some()
            || self.size_gt.is_some()
            || self.size_ge.is_some()
            || self.size_lt.is_some()
            || self.size_le.is_some()
    }

    pub(crate) fn has_content_criteria(&self) -> bool {
        self.md5.is_some()
            || self.sha1.is_some()
            || self.sha256.is_some()
            || self.contains.is_some()
            || self.header.is_some()
            || self.header_regex.is_some()
            || !self.scan_rules.is_empty()
    }

    /// Terms whose criteria only touch names and paths can run against bare
    /// $I30 entries
    pub(crate) fn i30_eligible(&self) -> bool {
        self.required.iter().all(|criteria| {
            matches!(
                criteria,
                Criteria::NameExact
                    | Criteria::NameMatch
                    | Criteria::NameRegex
                    | Criteria::PathExact
                    | Criteria::PathMatch
                    | Criteria::PathRegex
            )
        })
    }

    /// Every name criterion present must match
    pub(crate) fn matches_name(&self, name: &str) -> bool {
        if let Some(exact) = &self.name_exact {
            if !caseless_eq(exact, name) {
                return false;
            }
        }
        if let Some(pattern) = &self.name_glob {
            if !pattern.matches_with(name, GLOB_OPTIONS) {
                return false;
            }
        }
        if let Some(regex) = &self.name_regex {
            if !regex.is_match(name) {
                return false;
            }
        }
        true
    }

    pub(crate) fn matches_path(&self, path: &str) -> bool {
        if let Some(exact) = &self.path_exact {
            if !caseless_eq(exact, path) {
                return false;
            }
        }
        if let Some(pattern) = &self.path_glob {
            if !pattern.matches_with(path, GLOB_OPTIONS) {
                return false;
            }
        }
        if let Some(regex) = &self.path_regex {
            if !regex.is_match(path) {
                return false;
            }
        }
        true
    }

    pub(crate) fn matches_ads(&self, stream_name: &str) -> bool {
        if let Some(exact) = &self.ads_exact {
            if !caseless_eq(exact, stream_name) {
                return false;
            }
        }
        if let Some(pattern) = &self.ads_glob {
            if !pattern.matches_with(stream_name, GLOB_OPTIONS) {
                return false;
            }
        }
        if let Some(regex) = &self.ads_regex {
            if !regex.is_match(stream_name) {
                return false;
            }
        }
        true
    }

    pub(crate) fn matches_ea(&self, ea_name: &str) -> bool {
        if let Some(exact) = &self.ea_exact {
            if !caseless_eq(exact, ea_name) {
                return false;
            }
        }
        if let Some(pattern) = &self.ea_glob {
            if !pattern.matches_with(ea_name, GLOB_OPTIONS) {
                return false;
            }
        }
        if let Some(regex) = &self.ea_regex {
            if !regex.is_match(ea_name) {
                return false;
            }
        }
        true
    }

    pub(crate) fn matches_attr_name(&self, attr_name: &str) -> bool {
        if let Some(exact) = &self.attr_exact {
            if !caseless_eq(exact, attr_name) {
                return false;
            }
        }
        if let Some(pattern) = &self.attr_glob {
            if !pattern.matches_with(attr_name, GLOB_OPTIONS) {
                return false;
            }
        }
        if let Some(regex) = &self.attr_regex {
            if !regex.is_match(attr_name) {
                return false;
            }
        }
        true
    }

    pub(crate) fn matches_size(&self, size: u64) -> bool {
        if let Some(value) = self.size_eq {
            if size != value {
                return false;
            }
        }
        if let Some(value) = self.size_gt {
            if size <= value {
                return false;
            }
        }
        if let Some(value) = self.size_ge {
            if size < value {
                return false;
            }
        }
        if let Some(value) = self.size_lt {
            if size >= value {
                return false;
            }
        }
        if let Some(value) = self.size_le {
            if size > value {
                return false;
            }
        }
        true
    }

    fn synthesize_description(&self, config: &RuleConfig) -> String {
        let mut parts = Vec::new();
        if let Some(value) = &config.name {
            parts.push(format!("name={value}"));
        }
        if let Some(value) = &self.name_exact {
            parts.push(format!("name_exact={value}"));
        }
        if self.name_glob.is_some() || self.name_regex.is_some() {
            if let Some(value) = config.name_match.as_deref().or(config.name_regex.as_deref()) {
                parts.push(format!("name~{value}"));
            }
        }
        if let Some(value) = &self.path_exact {
            parts.push(format!("path={value}"));
        }
        if let Some(value) = self.size_eq {
            parts.push(format!("size={value}"));
        }
        if let Some(value) = self.size_gt {
            parts.push(format!("size>{value}"));
        }
        if let Some(value) = self.size_ge {
            parts.push(format!("size>={value}"));
        }
        if let Some(value) = self.size_lt {
            parts.push(format!("size<{value}"));
        }
        if let Some(value) = self.size_le {
            parts.push(format!("size<={value}"));
        }
        if let Some(value) = &self.md5 {
            parts.push(format!("md5={value}"));
        }
        if let Some(value) = &self.sha1 {
            parts.push(format!("sha1={value}"));
        }
        if let Some(value) = &self.sha256 {
            parts.push(format!("sha256={value}"));
        }
        if self.contains.is_some() {
            parts.push(String::from("contains"));
        }
        if self.header.is_some() || self.header_regex.is_some() {
            parts.push(String::from("header"));
        }
        if !self.scan_rules.is_empty() {
            parts.push(format!("rules={}", self.scan_rules.join("+")));
        }
        if parts.is_empty() {
            parts.push(String::from("term"));
        }
        parts.join(", ")
    }
}

/// Free-form pattern classifier: regex metacharacters win, then glob
/// wildcards, else the value is literal
fn discriminate(value: &str) -> PatternKind {
    let regex_chars = [':', '+', '{', '}', '[', ']', '(', ')'];
    if value.chars().any(|c| regex_chars.contains(&c)) {
        return PatternKind::Regex;
    }
    if value.contains('*') || value.contains('?') {
        return PatternKind::Glob;
    }
    PatternKind::Exact
}

fn compile_glob(value: &str) -> Result<Pattern, RuleError> {
    let pattern_result = Pattern::new(value);
    match pattern_result {
        Ok(result) => Ok(result),
        Err(err) => {
            error!("[filefind] Bad glob {value}: {err:?}");
            Err(RuleError::BadGlob)
        }
    }
}

fn compile_regex(value: &str) -> Result<Regex, RuleError> {
    match create_caseless_regex(value) {
        Ok(result) => Ok(result),
        Err(_err) => Err(RuleError::BadRegex),
    }
}

/// Combination rules: free-form name excludes the specific fields, EA and
/// ADS never mix, attribute criteria never mix with EA or ADS, exact size
/// excludes every other size bound, strict and inclusive bounds of the same
/// direction never mix
fn validate_combinations(config: &RuleConfig) -> Result<(), RuleError> {
    let has_name_specific = config.name_exact.is_some()
        || config.name_match.is_some()
        || config.name_regex.is_some()
        || config.path_exact.is_some()
        || config.path_match.is_some()
        || config.path_regex.is_some()
        || config.ads_exact.is_some()
        || config.ads_match.is_some()
        || config.ads_regex.is_some()
        || config.ea_exact.is_some()
        || config.ea_match.is_some()
        || config.ea_regex.is_some();
    if config.name.is_some() && has_name_specific {
        error!("[filefind] name cannot combine with name/path/ads/ea fields");
        return Err(RuleError::InvalidRule);
    }

    let has_ads = config.ads_exact.is_some()
        || config.ads_match.is_some()
        || config.ads_regex.is_some()
        || matches!(&config.name, Some(name) if !name.contains('#') && name.contains(':'));
    let has_ea = config.ea_exact.is_some()
        || config.ea_match.is_some()
        || config.ea_regex.is_some()
        || matches!(&config.name, Some(name) if name.contains('#'));
    if has_ads && has_ea {
        error!("[filefind] EA and ADS criteria cannot combine");
        return Err(RuleError::InvalidRule);
    }

    let has_attr = config.attr_name_exact.is_some()
        || config.attr_name_match.is_some()
        || config.attr_name_regex.is_some()
        || config.attr_type.is_some();
    if has_attr && (has_ads || has_ea) {
        error!("[filefind] Attribute criteria cannot combine with EA or ADS");
        return Err(RuleError::InvalidRule);
    }

    let has_bounds = config.size_gt.is_some()
        || config.size_ge.is_some()
        || config.size_lt.is_some()
        || config.size_le.is_some();
    if config.size.is_some() && has_bounds {
        error!("[filefind] Exact size cannot combine with size bounds");
        return Err(RuleError::InvalidRule);
    }
    if config.size_gt.is_some() && config.size_ge.is_some() {
        error!("[filefind] size_gt cannot combine with size_ge");
        return Err(RuleError::InvalidRule);
    }
    if config.size_lt.is_some() && config.size_le.is_some() {
        error!("[filefind] size_lt cannot combine with size_le");
        return Err(RuleError::InvalidRule);
    }

    Ok(())
}

/// Decode a hex literal, spaces allowed
fn decode_hex(value: &str) -> Result<Vec<u8>, RuleError> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 != 0 {
        return Err(RuleError::BadHex);
    }
    let mut bytes = Vec::with_capacity(cleaned.len() / 2);
    let chars: Vec<char> = cleaned.chars().collect();
    for pair in chars.chunks(2) {
        let high = pair[0].to_digit(16);
        let low = pair[1].to_digit(16);
        match (high, low) {
            (Some(high), Some(low)) => bytes.push(((high << 4) | low) as u8),
            _ => return Err(RuleError::BadHex),
        }
    }
    Ok(bytes)
}

/// Hash literals are fixed-length hex, compared lowercase
fn validate_hash(value: &str, expected_len: usize) -> Result<String, RuleError> {
    if value.len() != expected_len || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        error!("[filefind] Bad hash literal {value}");
        return Err(RuleError::InvalidRule);
    }
    Ok(value.to_ascii_lowercase())
}
