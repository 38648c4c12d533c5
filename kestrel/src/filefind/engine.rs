use super::{
    error::RuleError,
    hasher::hash_stream,
    matcher::{read_header, BoyerMoore},
    scanner::{ContentScanner, NoopScanner},
    term::SearchTerm,
};
use crate::ntfs::{
    attributes::{data::DataAttribute, extended::parse_ea_entries},
    error::NtfsError,
    i30::I30Emission,
    record::{AttributeValue, MftAttribute},
    stream::read_all,
    walker::{RecordView, RecordVisitor, VisitContext},
};
use crate::structs::rules::RuleFile;
use crate::utils::time::{filetime_to_unixepoch, unixepoch_to_iso};
use common::{
    files::Hashes,
    windows::{
        AttributeMatch, FileMatch, FileNameTimes, I30EntryInfo, NameMatch, StandardInfoSnapshot,
    },
};
use log::{error, warn};
use std::collections::{HashMap, HashSet};

/// Fast-path partitioning of one term list: exact name, exact path, and
/// exact size lookups are O(1), everything else lands in the general list
#[derive(Debug, Default)]
struct TermIndex {
    exact_name: HashMap<String, Vec<usize>>,
    exact_path: HashMap<String, Vec<usize>>,
    exact_size: HashMap<u64, Vec<usize>>,
    general: Vec<usize>,
}

impl TermIndex {
    fn add(&mut self, term: &SearchTerm, index: usize) {
        if let Some(name) = &term.name_exact {
            self.exact_name
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(index);
        } else if let Some(path) = &term.path_exact {
            self.exact_path
                .entry(path.to_ascii_lowercase())
                .or_default()
                .push(index);
        } else if let Some(size) = term.size_eq {
            self.exact_size.entry(size).or_default().push(index);
        } else {
            self.general.push(index);
        }
    }

    /// All terms that could possibly match this record
    fn candidates(&self, view: &RecordView<'_>, unnamed_size: u64) -> Vec<usize> {
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();

        for name in &view.names {
            if let Some(terms) = self.exact_name.get(&name.file_name.to_ascii_lowercase()) {
                for term in terms {
                    if seen.insert(*term) {
                        candidates.push(*term);
                    }
                }
            }
            if let Some(terms) = self.exact_path.get(&name.full_path.to_ascii_lowercase()) {
                for term in terms {
                    if seen.insert(*term) {
                        candidates.push(*term);
                    }
                }
            }
        }
        if let Some(terms) = self.exact_size.get(&unnamed_size) {
            for term in terms {
                if seen.insert(*term) {
                    candidates.push(*term);
                }
            }
        }
        for term in &self.general {
            if seen.insert(*term) {
                candidates.push(*term);
            }
        }
        candidates.sort_unstable();
        candidates
    }
}

/// Hash cache and scanner handle threaded through one term evaluation
struct EvalState<'a> {
    cache: &'a mut HashMap<(u64, u16, String), (String, String, String)>,
    scanner: &'a mut dyn ContentScanner,
    demand: Hashes,
}

/// The rule engine: holds inclusion and exclusion term sets, classifies
/// every record the walker delivers, and emits matches
pub struct FileFind {
    terms: Vec<SearchTerm>,
    exclude_terms: Vec<SearchTerm>,
    include_index: TermIndex,
    exclude_index: TermIndex,
    /// Inclusion terms usable against bare $I30 entries
    i30_terms: Vec<usize>,
    hash_demand: Hashes,
    scanner: Box<dyn ContentScanner>,
    computer: String,
    hash_cache: HashMap<(u64, u16, String), (String, String, String)>,
    matches: Vec<FileMatch>,
}

impl FileFind {
    pub fn new(computer: &str) -> FileFind {
        FileFind::with_scanner(computer, Box::new(NoopScanner))
    }

    pub fn with_scanner(computer: &str, scanner: Box<dyn ContentScanner>) -> FileFind {
        FileFind {
            terms: Vec::new(),
            exclude_terms: Vec::new(),
            include_index: TermIndex::default(),
            exclude_index: TermIndex::default(),
            i30_terms: Vec::new(),
            hash_demand: Hashes::default(),
            scanner,
            computer: computer.to_string(),
            hash_cache: HashMap::new(),
            matches: Vec::new(),
        }
    }

    /// Compile a rule document. Invalid rules are rejected and counted, the
    /// rest of the document still loads
    pub fn add_rules(&mut self, rules: &RuleFile) -> usize {
        let mut rejected = 0;
        for config in &rules.include {
            match SearchTerm::from_config(config) {
                Ok(term) => self.push_include(term),
                Err(err) => {
                    error!("[filefind] Rejected include rule: {err:?}");
                    rejected += 1;
                }
            }
        }
        for config in &rules.exclude {
            match SearchTerm::from_config(config) {
                Ok(term) => self.push_exclude(term),
                Err(err) => {
                    error!("[filefind] Rejected exclude rule: {err:?}");
                    rejected += 1;
                }
            }
        }
        rejected
    }

    pub fn push_include(&mut self, term: SearchTerm) {
        self.warn_unresolved(&term);
        self.merge_demand(&term);
        let index = self.terms.len();
        self.include_index.add(&term, index);
        if term.i30_eligible() {
            self.i30_terms.push(index);
        }
        self.terms.push(term);
    }

    pub fn push_exclude(&mut self, term: SearchTerm) {
        self.warn_unresolved(&term);
        self.merge_demand(&term);
        let index = self.exclude_terms.len();
        self.exclude_index.add(&term, index);
        self.exclude_terms.push(term);
    }

    /// Union of hash algorithms any term mentions. Only these are computed
    pub fn hash_demand(&self) -> Hashes {
        self.hash_demand
    }

    pub fn matches(&self) -> &[FileMatch] {
        &self.matches
    }

    pub fn take_matches(&mut self) -> Vec<FileMatch> {
        std::mem::take(&mut self.matches)
    }

    fn merge_demand(&mut self, term: &SearchTerm) {
        self.hash_demand.merge(&Hashes {
            md5: term.md5.is_some(),
            sha1: term.sha1.is_some(),
            sha256: term.sha256.is_some(),
        });
    }

    /// A term naming scan rules the scanner does not know is warned about,
    /// not rejected. The criterion simply can never fire
    fn warn_unresolved(&self, term: &SearchTerm) {
        for rule in &term.scan_rules {
            if !self.scanner.known_rule(rule) {
                warn!(
                    "[filefind] Term references unknown scan rule {rule}: {}",
                    RuleError::UnresolvedRule
                );
            }
        }
    }
}

impl RecordVisitor for FileFind {
    fn element(
        &mut self,
        ctx: &mut VisitContext<'_>,
        view: &RecordView<'_>,
    ) -> Result<(), NtfsError> {
        let unnamed_size = unnamed_data_size(view);
        let candidates = self.include_index.candidates(view, unnamed_size);
        if candidates.is_empty() {
            return Ok(());
        }

        let exclusion_candidates = self.exclude_index.candidates(view, unnamed_size);

        for index in candidates {
            let mut state = EvalState {
                cache: &mut self.hash_cache,
                scanner: self.scanner.as_mut(),
                demand: self.hash_demand,
            };
            let draft = evaluate_term(&self.terms[index], ctx, view, &mut state);
            let mut file_match = match draft {
                Some(result) => result,
                None => continue,
            };

            // Exclusion terms evaluate against the same record. Any hit
            // suppresses the match
            let mut excluded = false;
            for exclusion in &exclusion_candidates {
                let mut state = EvalState {
                    cache: &mut self.hash_cache,
                    scanner: self.scanner.as_mut(),
                    demand: self.hash_demand,
                };
                if evaluate_term(&self.exclude_terms[*exclusion], ctx, view, &mut state).is_some()
                {
                    excluded = true;
                    break;
                }
            }
            if excluded {
                continue;
            }

            file_match.computer = self.computer.clone();
            file_match.volume_serial = ctx.volume.volume_serial;
            file_match.snapshot_id = ctx.volume.snapshot_id.clone().unwrap_or_default();
            self.matches.push(file_match);
        }

        Ok(())
    }

    /// Fast path for directory index entries: only terms that depend on
    /// nothing but name or path can fire here
    fn i30(
        &mut self,
        ctx: &mut VisitContext<'_>,
        view: &RecordView<'_>,
        emission: &I30Emission,
    ) -> Result<(), NtfsError> {
        let file_name = match &emission.entry.file_name {
            Some(result) => result,
            None => return Ok(()),
        };

        // Entry path: the directory's own path plus the entry name
        let directory_path = view
            .names
            .first()
            .map(|name| name.full_path.clone())
            .unwrap_or_default();
        let full_path = format!("{directory_path}\\{}", file_name.name);

        for index in &self.i30_terms {
            let term = &self.terms[*index];
            if term.has_name_criteria() && !term.matches_name(&file_name.name) {
                continue;
            }
            if term.has_path_criteria() && !term.matches_path(&full_path) {
                continue;
            }

            let excluded = self.exclude_terms.iter().any(|exclusion| {
                exclusion.i30_eligible()
                    && (!exclusion.has_name_criteria()
                        || exclusion.matches_name(&file_name.name))
                    && (!exclusion.has_path_criteria() || exclusion.matches_path(&full_path))
            });
            if excluded {
                continue;
            }

            self.matches.push(FileMatch {
                computer: self.computer.clone(),
                volume_serial: ctx.volume.volume_serial,
                snapshot_id: ctx.volume.snapshot_id.clone().unwrap_or_default(),
                frn: emission.entry.reference.to_safe().as_u64(),
                parent_frn: file_name.parent.to_safe().as_u64(),
                size: file_name.size,
                rule: term.description.clone(),
                names: vec![NameMatch {
                    file_name: file_name.name.clone(),
                    full_path: full_path.clone(),
                }],
                attributes: Vec::new(),
                standard_information: None,
                filename_times: Some(FileNameTimes {
                    created: unixepoch_to_iso(filetime_to_unixepoch(file_name.created)),
                    modified: unixepoch_to_iso(filetime_to_unixepoch(file_name.modified)),
                    accessed: unixepoch_to_iso(filetime_to_unixepoch(file_name.accessed)),
                    changed: unixepoch_to_iso(filetime_to_unixepoch(file_name.changed)),
                }),
                deleted: emission.carved,
                i30: Some(I30EntryInfo {
                    parent_frn: view.record.segment.as_u64(),
                    carved: emission.carved,
                }),
            });
        }

        Ok(())
    }

    fn wants_i30(&self) -> bool {
        !self.i30_terms.is_empty()
    }
}

/// Unnamed $DATA stream size, the record's file size for size predicates
fn unnamed_data_size(view: &RecordView<'_>) -> u64 {
    view.attributes
        .iter()
        .find_map(|attr| match attr.data() {
            Some(data) if data.is_unnamed() => Some(data.size()),
            _ => None,
        })
        .unwrap_or(0)
}

/// Evaluate one term against one record view. Cheap predicates run first,
/// content predicates open the data stream facade and run last
fn evaluate_term(
    term: &SearchTerm,
    ctx: &mut VisitContext<'_>,
    view: &RecordView<'_>,
    state: &mut EvalState<'_>,
) -> Option<FileMatch> {
    // 1. Names
    let mut names: Vec<usize> = Vec::new();
    for (index, name) in view.names.iter().enumerate() {
        if term.has_name_criteria() && !term.matches_name(&name.file_name) {
            continue;
        }
        names.push(index);
    }
    if (term.has_name_criteria() || term.has_path_criteria()) && names.is_empty() {
        return None;
    }

    // 2. Paths
    if term.has_path_criteria() {
        names.retain(|index| term.matches_path(&view.names[*index].full_path));
        if names.is_empty() {
            return None;
        }
    }

    // 3. Data attribute name and size predicates
    let data_attrs: Vec<&MftAttribute> = view.data_attributes();
    let unnamed_size = unnamed_data_size(view);
    if term.has_size_criteria() && !term.matches_size(unnamed_size) {
        return None;
    }

    let mut ads_streams: Vec<&MftAttribute> = Vec::new();
    if term.has_ads_criteria() {
        for attr in data_attrs.iter().copied() {
            if let Some(data) = attr.data() {
                if !data.is_unnamed() && term.matches_ads(&data.name) {
                    ads_streams.push(attr);
                }
            }
        }
        if ads_streams.is_empty() {
            return None;
        }
    }

    if term.has_ea_criteria() && !ea_matches(term, ctx, view) {
        return None;
    }

    // 4. Location gate: at least one surviving name must be under a
    // configured sub-tree root
    if !view.names.is_empty() && !names.iter().any(|index| view.names[*index].in_location) {
        return None;
    }

    // 5. Attribute type and name predicates
    if term.has_attr_criteria() {
        let hit = view.attributes.iter().any(|attr| {
            let type_ok = match term.attr_type {
                Some(code) => attr.type_code() == code,
                None => true,
            };
            type_ok && term.matches_attr_name(attr.name())
        });
        if !hit {
            return None;
        }
    }

    // 6. Content predicates, costliest last
    let content_candidates: Vec<&MftAttribute> = if term.has_ads_criteria() {
        ads_streams.clone()
    } else {
        data_attrs.clone()
    };

    let mut matched_streams: Vec<(&MftAttribute, Vec<String>)> = Vec::new();
    if term.has_content_criteria() {
        for attr in content_candidates.iter().copied() {
            let data = match attr.data() {
                Some(result) => result,
                None => continue,
            };
            match content_matches(term, ctx, view, data, attr, state) {
                Some(fired_rules) => matched_streams.push((attr, fired_rules)),
                None => {}
            }
        }
        if matched_streams.is_empty() {
            return None;
        }
    } else {
        for attr in content_candidates.iter().copied() {
            matched_streams.push((attr, Vec::new()));
        }
    }

    // Build the match
    let record = view.record;
    let segment_key = record.segment.as_u64();
    let mut attribute_matches = Vec::new();
    for (attr, fired_rules) in &matched_streams {
        let data = match attr.data() {
            Some(result) => result,
            None => continue,
        };
        let (md5, sha1, sha256) = if state.demand.any() {
            stream_hashes(state, ctx, segment_key, attr, data)
        } else {
            (String::new(), String::new(), String::new())
        };
        attribute_matches.push(AttributeMatch {
            attr_type: attr.type_code(),
            instance: attr.instance(),
            name: data.name.clone(),
            size: data.size(),
            md5,
            sha1,
            sha256,
            matched_rules: fired_rules.clone(),
        });
    }

    let name_matches: Vec<NameMatch> = names
        .iter()
        .map(|index| NameMatch {
            file_name: view.names[*index].file_name.clone(),
            full_path: view.names[*index].full_path.clone(),
        })
        .collect();

    let standard_information = record.standard_info().map(|info| StandardInfoSnapshot {
        created: unixepoch_to_iso(filetime_to_unixepoch(info.created)),
        modified: unixepoch_to_iso(filetime_to_unixepoch(info.modified)),
        accessed: unixepoch_to_iso(filetime_to_unixepoch(info.accessed)),
        changed: unixepoch_to_iso(filetime_to_unixepoch(info.changed)),
        file_attributes: info.file_attributes,
        usn: info.usn,
        security_id: info.security_id,
    });

    let filename_times = names.first().and_then(|index| {
        record
            .file_names()
            .get(view.names[*index].name_index)
            .map(|file_name| FileNameTimes {
                created: unixepoch_to_iso(filetime_to_unixepoch(file_name.created)),
                modified: unixepoch_to_iso(filetime_to_unixepoch(file_name.modified)),
                accessed: unixepoch_to_iso(filetime_to_unixepoch(file_name.accessed)),
                changed: unixepoch_to_iso(filetime_to_unixepoch(file_name.changed)),
            })
    });

    let parent_frn = names
        .first()
        .map(|index| view.names[*index].parent.as_u64())
        .unwrap_or(0);

    Some(FileMatch {
        computer: String::new(),
        volume_serial: 0,
        snapshot_id: String::new(),
        frn: segment_key,
        parent_frn,
        size: unnamed_size,
        rule: term.description.clone(),
        names: name_matches,
        attributes: attribute_matches,
        standard_information,
        filename_times,
        deleted: view.deleted,
        i30: None,
    })
}

/// Every content criterion of the term must pass for this stream. A read
/// error fails only this stream, other streams of the record still evaluate
fn content_matches(
    term: &SearchTerm,
    ctx: &mut VisitContext<'_>,
    view: &RecordView<'_>,
    data: &DataAttribute,
    attr: &MftAttribute,
    state: &mut EvalState<'_>,
) -> Option<Vec<String>> {
    let cluster_size = ctx.volume.cluster_size;

    if term.md5.is_some() || term.sha1.is_some() || term.sha256.is_some() {
        let segment_key = view.record.segment.as_u64();
        let (md5, sha1, sha256) = stream_hashes(state, ctx, segment_key, attr, data);
        if let Some(expected) = &term.md5 {
            if &md5 != expected {
                return None;
            }
        }
        if let Some(expected) = &term.sha1 {
            if &sha1 != expected {
                return None;
            }
        }
        if let Some(expected) = &term.sha256 {
            if &sha256 != expected {
                return None;
            }
        }
    }

    if let Some(needle) = &term.contains {
        let matcher = BoyerMoore::new(needle);
        let found = matcher.search_stream(ctx.reader, data, cluster_size);
        match found {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                error!("[filefind] Substring search failed: {err:?}");
                return None;
            }
        }
    }

    if let Some(header) = &term.header {
        let stream_header = read_header(ctx.reader, data, cluster_size, term.header_len)?;
        if &stream_header != header {
            return None;
        }
    }

    if let Some(regex) = &term.header_regex {
        let stream_header = read_header(ctx.reader, data, cluster_size, term.header_len)?;
        if !regex.is_match(&stream_header) {
            return None;
        }
    }

    let mut fired_rules = Vec::new();
    if !term.scan_rules.is_empty() {
        let stream_data = match read_all(ctx.reader, cluster_size, data) {
            Ok(result) => result,
            Err(err) => {
                error!("[filefind] Could not read stream for scanning: {err:?}");
                return None;
            }
        };
        let scan_result = state.scanner.scan(&stream_data);
        let hits = match scan_result {
            Ok(result) => result,
            Err(err) => {
                error!("[filefind] Content scan failed: {err:?}");
                return None;
            }
        };
        fired_rules = hits
            .into_iter()
            .filter(|hit| term.scan_rules.iter().any(|rule| rule == hit))
            .collect();
        if fired_rules.is_empty() {
            return None;
        }
    }

    Some(fired_rules)
}

/// Demanded hashes for one stream, computed once and cached
fn stream_hashes(
    state: &mut EvalState<'_>,
    ctx: &mut VisitContext<'_>,
    segment_key: u64,
    attr: &MftAttribute,
    data: &DataAttribute,
) -> (String, String, String) {
    let key = (segment_key, attr.instance(), data.name.clone());
    if let Some(hashes) = state.cache.get(&key) {
        return hashes.clone();
    }
    let hashes = hash_stream(ctx.reader, data, ctx.volume.cluster_size, &state.demand);
    state.cache.insert(key, hashes.clone());
    hashes
}

/// Extended attribute names of the record, matched against the term
fn ea_matches(term: &SearchTerm, ctx: &mut VisitContext<'_>, view: &RecordView<'_>) -> bool {
    for attr in &view.attributes {
        let stream = match &attr.value {
            AttributeValue::Ea(stream) => stream,
            _ => continue,
        };
        let ea_data = match &stream.resident {
            Some(resident) => resident.clone(),
            None => match read_all(ctx.reader, ctx.volume.cluster_size, stream) {
                Ok(result) => result,
                Err(err) => {
                    error!("[filefind] Could not read $EA value: {err:?}");
                    continue;
                }
            },
        };
        for entry in parse_ea_entries(&ea_data) {
            if term.matches_ea(&entry.name) {
                return true;
            }
        }
    }
    false
}
