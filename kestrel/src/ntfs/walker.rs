use super::{
    attributes::filename::FileName,
    error::NtfsError,
    fixup::Fixup,
    header::FileRecordHeader,
    i30::{walk_i30, I30Emission},
    paths::{DirectoryNames, ResolvedName},
    record::{MftAttribute, MftRecord},
    secure::walk_secure,
    segment::{SafeSegmentNumber, SegmentReference},
    source::MftSource,
    store::{RecordHandle, RecordStore},
    stream::read_all,
};
use crate::filesystem::volume::{VolumeMeta, VolumeReader};
use crate::structs::locations::LocationSet;
use common::windows::SecurityDescriptorInfo;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};

/// Record index of the well-known $Secure metadata file
const SECURE_SEGMENT: u64 = 9;

/// Answer from the progress callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// A segment slot: live record, or a tombstone marking a segment already
/// processed and evicted so duplicate arrivals are ignored
#[derive(Debug, Clone, Copy)]
enum Slot {
    Live(RecordHandle),
    Tombstone,
}

/// One record as handed to callbacks: the record itself, its attribute set
/// merged across child records, and every resolved (name, path) pairing.
/// Borrowed from the walker, valid until `keep_alive` declines
pub struct RecordView<'a> {
    pub record: &'a MftRecord,
    pub attributes: Vec<&'a MftAttribute>,
    pub names: Vec<ResolvedName>,
    pub deleted: bool,
}

impl RecordView<'_> {
    /// Every $DATA attribute in the merged set
    pub fn data_attributes(&self) -> Vec<&MftAttribute> {
        self.attributes
            .iter()
            .filter(|attr| attr.data().is_some())
            .copied()
            .collect()
    }

    pub fn file_names(&self) -> Vec<&FileName> {
        self.record.file_names()
    }
}

/// Volume-level context passed to callbacks so they can read data streams
pub struct VisitContext<'a> {
    pub reader: &'a mut dyn VolumeReader,
    pub volume: &'a VolumeMeta,
    pub root: SafeSegmentNumber,
}

/// Callback bundle for one walk. Every method is optional except progress
/// is the only one consulted for cancellation. For a single record all
/// per-stream and per-name visits precede the `keep_alive` query
pub trait RecordVisitor {
    fn element(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn attribute(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
        _attr: &MftAttribute,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn data(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
        _attr: &MftAttribute,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn file_name(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
        _name: &ResolvedName,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn file_name_and_data(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
        _name: &ResolvedName,
        _attr: &MftAttribute,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn directory(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn i30(
        &mut self,
        _ctx: &mut VisitContext<'_>,
        _view: &RecordView<'_>,
        _emission: &I30Emission,
    ) -> Result<(), NtfsError> {
        Ok(())
    }

    fn secure_descriptor(&mut self, _info: &SecurityDescriptorInfo) -> Result<(), NtfsError> {
        Ok(())
    }

    /// Return false to let the walker evict the record after dispatch
    fn keep_alive(&mut self, _view: &RecordView<'_>) -> bool {
        false
    }

    fn progress(&mut self, _percent: u8) -> WalkControl {
        WalkControl::Continue
    }

    /// Bundles that do not care about $I30 skip the index drive entirely
    fn wants_i30(&self) -> bool {
        false
    }

    fn wants_secure_descriptors(&self) -> bool {
        false
    }
}

/// The record graph walker: consumes the MFT source, parses records, links
/// the cross-record graph, resolves paths, dispatches callbacks, and caps
/// the working set by evicting completed sub-trees
pub struct MftWalker {
    reader: Box<dyn VolumeReader>,
    source: Box<dyn MftSource>,
    meta: VolumeMeta,
    root: SafeSegmentNumber,
    store: RecordStore,
    records: HashMap<u64, Slot>,
    directory_names: DirectoryNames,
    locations: Vec<String>,
    include_not_in_use: bool,
    parse_i30: bool,
    parse_unallocated_indx: bool,
    sweep_threshold: usize,
    cells_at_last_sweep: usize,
    /// References that can never be fetched: unsupported source or fetch
    /// that came back empty
    unresolvable: HashSet<u64>,
    fetch_supported: bool,
}

impl MftWalker {
    pub fn new(
        reader: Box<dyn VolumeReader>,
        source: Box<dyn MftSource>,
        options: &LocationSet,
    ) -> MftWalker {
        let meta = VolumeMeta::from_reader(reader.as_ref());
        let root = source.root_segment();
        // Sweep when this many cells piled up since the last one
        let sweep_threshold = 65536;

        MftWalker {
            reader,
            source,
            meta,
            root,
            store: RecordStore::new(),
            records: HashMap::new(),
            directory_names: DirectoryNames::new(),
            locations: options.normalized_roots(),
            include_not_in_use: options.include_not_in_use,
            parse_i30: options.parse_i30,
            parse_unallocated_indx: options.parse_unallocated_indx,
            sweep_threshold,
            cells_at_last_sweep: 0,
            unresolvable: HashSet::new(),
            fetch_supported: true,
        }
    }

    pub fn volume_meta(&self) -> &VolumeMeta {
        &self.meta
    }

    pub fn root_segment(&self) -> SafeSegmentNumber {
        self.root
    }

    /// Path resolution exposed for consumers that hold a $FILE_NAME of
    /// their own (rule engines, index carvers)
    pub fn full_name_builder(
        &self,
        file_name: &FileName,
        stream_suffix: Option<&str>,
    ) -> (String, bool) {
        self.directory_names
            .full_name(file_name, self.root, stream_suffix)
    }

    /// Sub-tree membership filter for one resolved path
    pub fn in_location(&mut self, file_name: &FileName, full_path: &str) -> bool {
        self.directory_names
            .in_location(file_name, full_path, &self.locations)
    }

    /// Consume every record from the source. Returns when the source is
    /// exhausted (after the final relaxed sweep) or a callback stops the
    /// walk
    pub fn walk(&mut self, visitor: &mut dyn RecordVisitor) -> Result<(), NtfsError> {
        let total = std::cmp::max(self.source.record_count(), 1);
        let mut buf = vec![0u8; self.meta.bytes_per_frs as usize];
        let mut processed: u64 = 0;
        let mut last_percent = 0;

        loop {
            let next = self.source.next_record(self.reader.as_mut(), &mut buf)?;
            let index = match next {
                Some(result) => result,
                None => break,
            };
            processed += 1;

            self.process_record(index, &buf, visitor)?;

            let percent = std::cmp::min(processed * 100 / total, 100) as u8;
            if percent != last_percent {
                last_percent = percent;
                if visitor.progress(percent) == WalkControl::Stop {
                    info!("[ntfs] Walk stopped at {percent}% by callback");
                    return Err(NtfsError::StopRequested);
                }
            }
        }

        self.final_sweep(visitor)
    }

    /// One record from the source: add, repair completeness, dispatch when
    /// complete, sweep when the store grew past the threshold
    fn process_record(
        &mut self,
        index: u64,
        bytes: &[u8],
        visitor: &mut dyn RecordVisitor,
    ) -> Result<(), NtfsError> {
        let key = match self.add_record(index, bytes) {
            Some(result) => result,
            None => return Ok(()),
        };

        self.repair_completeness(key);

        if let Some(Slot::Live(handle)) = self.records.get(&key).copied() {
            let called = match self.store.get(handle) {
                Some(cell) => cell.record.callback_called,
                None => true,
            };
            if !called {
                let (complete, _missing) = self.completeness(handle);
                if complete {
                    self.dispatch(key, handle, visitor)?;
                }
            }
        }

        if self.store.allocated_cells() >= self.cells_at_last_sweep + self.sweep_threshold {
            self.intermediate_sweep(visitor)?;
            self.cells_at_last_sweep = self.store.allocated_cells();
        }

        Ok(())
    }

    /// AddRecord: fixup, identity, duplicate/tombstone checks, parse, link.
    /// Returns the segment key when a live record was added
    fn add_record(&mut self, index: u64, bytes: &[u8]) -> Option<u64> {
        if !FileRecordHeader::has_file_signature(bytes) {
            return None;
        }
        let header = match FileRecordHeader::parse_header(bytes) {
            Ok(result) => result,
            Err(err) => {
                warn!("[ntfs] Record {index} header rejected: {err:?}");
                return None;
            }
        };

        let segment = header.safe_segment(index);
        let key = segment.as_u64();

        match self.records.get(&key) {
            Some(Slot::Tombstone) => return None,
            Some(Slot::Live(_)) => return None,
            None => {}
        }

        if !header.is_in_use() && !self.include_not_in_use {
            self.records.insert(key, Slot::Tombstone);
            return None;
        }

        // Fixup before any attribute walks. A torn record is rejected whole
        let mut raw = bytes.to_vec();
        let usa_start = header.usa_offset as usize;
        if usa_start + 2 > raw.len() {
            warn!("[ntfs] Record {segment} update sequence array out of bounds");
            self.records.insert(key, Slot::Tombstone);
            return None;
        }
        let fixup = match Fixup::get_fixup(&raw[usa_start..], header.usa_count) {
            Ok((_, result)) => result,
            Err(_err) => {
                warn!("[ntfs] Record {segment} update sequence array truncated");
                self.records.insert(key, Slot::Tombstone);
                return None;
            }
        };
        if let Err(err) = fixup.apply_fixup(&mut raw) {
            warn!("[ntfs] Record {segment} rejected: {err:?}");
            self.records.insert(key, Slot::Tombstone);
            return None;
        }

        let mut record = match MftRecord::parse(segment, header, &raw) {
            Ok(result) => result,
            Err(err) => {
                warn!("[ntfs] Record {segment} failed to parse: {err:?}");
                self.records.insert(key, Slot::Tombstone);
                return None;
            }
        };

        // A non-resident $ATTRIBUTE_LIST value lives in clusters; read it
        // now while the record is still unshared
        if let Some(stream_attr) = record.unresolved_list().cloned() {
            match read_all(self.reader.as_mut(), self.meta.cluster_size, &stream_attr) {
                Ok(list_data) => {
                    match super::attributes::list::AttributeListEntry::parse_list(&list_data) {
                        Ok((_, entries)) => record.resolve_list(entries),
                        Err(_err) => {
                            warn!("[ntfs] Record {segment} attribute list did not parse");
                        }
                    }
                }
                Err(err) => {
                    warn!("[ntfs] Record {segment} attribute list unreadable: {err:?}");
                }
            }
        }

        // Children are the attribute-list targets that live outside this
        // record
        let mut children: Vec<SafeSegmentNumber> = Vec::new();
        if let Some(entries) = record.attribute_list() {
            let mut seen = HashSet::new();
            for entry in entries {
                let target = entry.target.to_safe();
                if target.index != segment.index && seen.insert(target.as_u64()) {
                    children.push(target);
                }
            }
        }
        record.children = children;

        // Resolve list rows against records already loaded
        let resolved: Vec<bool> = match record.attribute_list() {
            Some(entries) => entries
                .iter()
                .map(|entry| {
                    entry.target.index() == segment.index
                        || self.is_present(entry.target.to_safe())
                })
                .collect(),
            None => Vec::new(),
        };
        if let Some(entries) = record.attribute_list_mut() {
            for (entry, is_resolved) in entries.iter_mut().zip(resolved) {
                entry.resolved = is_resolved;
            }
        }

        // Directories feed the path cache. Names carried by a child belong
        // to the base record
        if record.is_directory() {
            let owner = record.base.unwrap_or(segment);
            if let Some(file_name) = record.primary_name() {
                self.directory_names
                    .insert(owner, file_name.parent.to_safe(), file_name.name.clone());
            }
        }

        let base = record.base;
        let handle = self.store.allocate(record, raw);
        self.records.insert(key, Slot::Live(handle));

        // Link into an already-loaded base: mark its list rows resolved
        if let Some(base_segment) = base {
            if let Some(base_handle) = self.live_handle(base_segment) {
                if let Some(base_cell) = self.store.get_mut(base_handle) {
                    if let Some(entries) = base_cell.record.attribute_list_mut() {
                        for entry in entries.iter_mut() {
                            if entry.target.index() == segment.index {
                                entry.resolved = true;
                            }
                        }
                    }
                }
            }
        }

        Some(key)
    }

    /// Ask the source for the records a focal record still misses. Bounded:
    /// every reference is requested at most once per record, and a round
    /// that fetches nothing new ends the loop
    fn repair_completeness(&mut self, key: u64) {
        loop {
            let handle = match self.records.get(&key) {
                Some(Slot::Live(handle)) => *handle,
                _ => return,
            };
            let (complete, missing) = self.completeness(handle);
            if complete || missing.is_empty() {
                return;
            }

            let to_fetch: Vec<SegmentReference> = {
                let cell = match self.store.get_mut(handle) {
                    Some(result) => result,
                    None => return,
                };
                missing
                    .into_iter()
                    .filter(|reference| {
                        let ref_key = reference.to_safe().as_u64();
                        !self.unresolvable.contains(&ref_key)
                            && cell.record.fetched_refs.insert(ref_key)
                    })
                    .collect()
            };
            if to_fetch.is_empty() {
                return;
            }

            if !self.fetch_supported {
                for reference in &to_fetch {
                    self.unresolvable.insert(reference.to_safe().as_u64());
                }
                return;
            }

            let fetch_result = self
                .source
                .fetch_records(self.reader.as_mut(), &to_fetch);
            let fetched = match fetch_result {
                Ok(result) => result,
                Err(NtfsError::NotSupported) => {
                    info!("[ntfs] Source cannot fetch records, degrading gracefully");
                    self.fetch_supported = false;
                    for reference in &to_fetch {
                        self.unresolvable.insert(reference.to_safe().as_u64());
                    }
                    return;
                }
                Err(err) => {
                    // Fatal to this record only, the walk continues
                    error!("[ntfs] Fetch during completeness repair failed: {err:?}");
                    for reference in &to_fetch {
                        self.unresolvable.insert(reference.to_safe().as_u64());
                    }
                    return;
                }
            };

            if fetched.is_empty() {
                for reference in &to_fetch {
                    self.unresolvable.insert(reference.to_safe().as_u64());
                }
                return;
            }

            for (index, bytes) in fetched {
                let _ = self.add_record(index, &bytes);
            }
        }
    }

    /// Strict completeness: list rows resolve, children loaded and parsed,
    /// base loaded, every FILE_NAME ancestor chain reaches the root
    fn completeness(&self, handle: RecordHandle) -> (bool, Vec<SegmentReference>) {
        let cell = match self.store.get(handle) {
            Some(result) => result,
            None => return (false, Vec::new()),
        };
        let record = &cell.record;
        let mut missing: Vec<SegmentReference> = Vec::new();
        let mut complete = true;

        if record.unresolved_list().is_some() {
            complete = false;
        }

        if let Some(entries) = record.attribute_list() {
            for entry in entries {
                if entry.target.index() == record.segment.index {
                    continue;
                }
                if !self.is_present(entry.target.to_safe()) {
                    complete = false;
                    missing.push(entry.target);
                }
            }
        }

        for child in &record.children {
            if !self.is_present(*child) {
                complete = false;
                missing.push(child.to_reference());
            }
        }

        if let Some(base) = record.base {
            if !self.is_present(base) {
                complete = false;
                missing.push(base.to_reference());
            }
        }

        for file_name in record.file_names() {
            let mut current = file_name.parent.to_safe();
            let mut visited: HashSet<u64> = HashSet::new();
            while current.index != self.root.index {
                if !visited.insert(current.index) {
                    break;
                }
                match self.directory_names.lookup(current) {
                    Some(directory) => current = directory.parent,
                    None => {
                        complete = false;
                        missing.push(current.to_reference());
                        break;
                    }
                }
            }
        }

        let mut seen = HashSet::new();
        missing.retain(|reference| seen.insert(reference.to_safe().as_u64()));

        (complete, missing)
    }

    fn is_present(&self, segment: SafeSegmentNumber) -> bool {
        match self.records.get(&segment.as_u64()) {
            Some(Slot::Live(handle)) => self
                .store
                .get(*handle)
                .map(|cell| cell.record.parsed)
                .unwrap_or(false),
            // Already processed and evicted still counts as seen
            Some(Slot::Tombstone) => true,
            None => false,
        }
    }

    fn live_handle(&self, segment: SafeSegmentNumber) -> Option<RecordHandle> {
        match self.records.get(&segment.as_u64()) {
            Some(Slot::Live(handle)) => Some(*handle),
            _ => None,
        }
    }

    /// Dispatch one record to the callback bundle, then honor keep_alive
    fn dispatch(
        &mut self,
        key: u64,
        handle: RecordHandle,
        visitor: &mut dyn RecordVisitor,
    ) -> Result<(), NtfsError> {
        let keep = {
            let cell = match self.store.get(handle) {
                Some(result) => result,
                None => return Ok(()),
            };
            let record = &cell.record;

            // Merge the attribute set across resolved children, identity
            // (type, instance, name) kept unique
            let mut attributes: Vec<&MftAttribute> = Vec::new();
            let mut identities = HashSet::new();
            for attr in &record.attributes {
                identities.insert(attr.identity());
                attributes.push(attr);
            }
            for child in &record.children {
                if let Some(child_handle) = self.live_handle(*child) {
                    if let Some(child_cell) = self.store.get(child_handle) {
                        for attr in &child_cell.record.attributes {
                            if identities.insert(attr.identity()) {
                                attributes.push(attr);
                            }
                        }
                    }
                }
            }

            // Resolve every (name, path) pairing up front so callbacks see
            // finished paths
            let mut names = Vec::new();
            for (name_index, file_name) in record.file_names().into_iter().enumerate() {
                let (full_path, placeholder) =
                    self.directory_names
                        .full_name(file_name, self.root, None);
                let in_location = self.directory_names.in_location(
                    file_name,
                    &full_path,
                    &self.locations,
                );
                names.push(ResolvedName {
                    name_index,
                    file_name: file_name.name.clone(),
                    full_path,
                    in_location,
                    placeholder,
                    parent: file_name.parent.to_safe(),
                });
            }

            let in_scope =
                self.locations.is_empty() || names.iter().any(|name| name.in_location);
            // Child records surface through their base, never on their own
            let standalone = record.base.is_none();

            let view = RecordView {
                record,
                attributes,
                names,
                deleted: !record.in_use(),
            };

            if in_scope && standalone {
                // $Secure is driven before the regular bundle
                let mut secure_descriptors: Vec<SecurityDescriptorInfo> = Vec::new();
                if visitor.wants_secure_descriptors()
                    && record.segment.index == SECURE_SEGMENT
                {
                    match walk_secure(
                        self.reader.as_mut(),
                        self.meta.cluster_size,
                        &view.attributes,
                    ) {
                        Ok(result) => secure_descriptors = result,
                        Err(err) => {
                            error!("[ntfs] $Secure drive failed: {err:?}");
                        }
                    }
                }

                let mut i30_emissions: Vec<I30Emission> = Vec::new();
                if self.parse_i30 && visitor.wants_i30() && record.is_directory() {
                    match walk_i30(
                        self.reader.as_mut(),
                        self.meta.cluster_size,
                        &view.attributes,
                        record.segment,
                        self.parse_unallocated_indx,
                    ) {
                        Ok(result) => i30_emissions = result,
                        Err(err) => {
                            warn!(
                                "[ntfs] $I30 drive failed for {}: {err:?}",
                                record.segment
                            );
                        }
                    }
                }

                let mut ctx = VisitContext {
                    reader: self.reader.as_mut(),
                    volume: &self.meta,
                    root: self.root,
                };

                for info in &secure_descriptors {
                    visitor.secure_descriptor(info)?;
                }

                visitor.element(&mut ctx, &view)?;

                let data_attrs = view.data_attributes();
                for attr in view.attributes.iter().copied() {
                    visitor.attribute(&mut ctx, &view, attr)?;
                }
                for attr in data_attrs.iter().copied() {
                    visitor.data(&mut ctx, &view, attr)?;
                }
                for name in &view.names {
                    visitor.file_name(&mut ctx, &view, name)?;
                    for attr in data_attrs.iter().copied() {
                        visitor.file_name_and_data(&mut ctx, &view, name, attr)?;
                    }
                }
                if record.is_directory() {
                    visitor.directory(&mut ctx, &view)?;
                }
                for emission in &i30_emissions {
                    visitor.i30(&mut ctx, &view, emission)?;
                }

                visitor.keep_alive(&view)
            } else if !standalone {
                // A child cell stays alive until its base has been handed
                // out, the base's merged view still needs these attributes
                match record.base.and_then(|base| self.live_handle(base)) {
                    Some(base_handle) => self
                        .store
                        .get(base_handle)
                        .map(|base_cell| !base_cell.record.callback_called)
                        .unwrap_or(false),
                    None => false,
                }
            } else {
                false
            }
        };

        if let Some(cell) = self.store.get_mut(handle) {
            cell.record.callback_called = true;
        }
        if !keep {
            self.store.free(handle);
            self.records.insert(key, Slot::Tombstone);
        }

        Ok(())
    }

    /// Intermediate sweep: dispatch whatever became complete since the last
    /// pass and let keep_alive trim the store
    fn intermediate_sweep(&mut self, visitor: &mut dyn RecordVisitor) -> Result<(), NtfsError> {
        for handle in self.store.live_handles() {
            let (segment, called) = match self.store.get(handle) {
                Some(cell) => (cell.record.segment, cell.record.callback_called),
                None => continue,
            };
            if called {
                continue;
            }
            let (complete, _missing) = self.completeness(handle);
            if complete {
                self.dispatch(segment.as_u64(), handle, visitor)?;
            }
        }
        Ok(())
    }

    /// Final sweep after source exhaustion: completeness is relaxed, every
    /// remaining record reaches the callback as-is, then everything is
    /// freed
    fn final_sweep(&mut self, visitor: &mut dyn RecordVisitor) -> Result<(), NtfsError> {
        for handle in self.store.live_handles() {
            let (segment, called) = match self.store.get(handle) {
                Some(cell) => (cell.record.segment, cell.record.callback_called),
                None => continue,
            };
            if !called {
                self.dispatch(segment.as_u64(), handle, visitor)?;
            }
        }

        for handle in self.store.live_handles() {
            let segment = match self.store.get(handle) {
                Some(cell) => cell.record.segment,
                None => continue,
            };
            self.store.free(handle);
            self.records.insert(segment.as_u64(), Slot::Tombstone);
        }
        Ok(())
    }
}
