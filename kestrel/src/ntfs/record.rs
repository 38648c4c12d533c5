use super::{
    attributes::{
        data::{parse_run_list, DataAttribute},
        extended::EaInformation,
        filename::FileName,
        header::{AttributeHeader, AttributeType, ResidentFlag},
        index::IndexRoot,
        list::AttributeListEntry,
        object::ObjectId,
        reparse::ReparsePoint,
        standard::StandardInfo,
    },
    error::NtfsError,
    header::FileRecordHeader,
    segment::SafeSegmentNumber,
};
use log::warn;
use std::collections::HashSet;

/// One attribute of a record: common header plus a typed view of the value
#[derive(Debug, Clone)]
pub struct MftAttribute {
    pub(crate) header: AttributeHeader,
    pub(crate) value: AttributeValue,
}

/// Typed attribute views. Stream-backed values ($DATA, $INDEX_ALLOCATION,
/// $BITMAP, $EA) share the `DataAttribute` carrier
#[derive(Debug, Clone)]
pub enum AttributeValue {
    Standard(StandardInfo),
    FileName(FileName),
    List(Vec<AttributeListEntry>),
    /// $ATTRIBUTE_LIST whose value is non-resident. The walker reads it
    /// through the volume and replaces it with `List`
    ListNonResident(DataAttribute),
    Data(DataAttribute),
    IndexRoot(IndexRoot),
    IndexAllocation(DataAttribute),
    Bitmap(DataAttribute),
    EaInformation(EaInformation),
    Ea(DataAttribute),
    ObjectId(ObjectId),
    Reparse(ReparsePoint),
    Other(Vec<u8>),
}

impl MftAttribute {
    pub fn attrib_type(&self) -> AttributeType {
        self.header.attrib_type
    }

    pub fn type_code(&self) -> u32 {
        self.header.type_code
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn instance(&self) -> u16 {
        self.header.instance
    }

    /// Attribute identity inside one logical record
    pub(crate) fn identity(&self) -> (u32, u16, String) {
        (
            self.header.type_code,
            self.header.instance,
            self.header.name.clone(),
        )
    }

    pub fn data(&self) -> Option<&DataAttribute> {
        match &self.value {
            AttributeValue::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// One parsed MFT file record
#[derive(Debug, Clone)]
pub struct MftRecord {
    pub segment: SafeSegmentNumber,
    pub(crate) header: FileRecordHeader,
    /// Base record reference for child records
    pub base: Option<SafeSegmentNumber>,
    /// Child records listed by this record's $ATTRIBUTE_LIST
    pub(crate) children: Vec<SafeSegmentNumber>,
    pub(crate) attributes: Vec<MftAttribute>,
    pub(crate) parsed: bool,
    pub(crate) callback_called: bool,
    /// References already requested during completeness repair
    pub(crate) fetched_refs: HashSet<u64>,
}

impl MftRecord {
    /// Parse a record from fixed-up bytes. `segment` was synthesized by the
    /// caller from the header and the record's position in the MFT
    pub(crate) fn parse(
        segment: SafeSegmentNumber,
        header: FileRecordHeader,
        data: &[u8],
    ) -> Result<MftRecord, NtfsError> {
        let base = if header.has_base() {
            Some(SafeSegmentNumber::new(
                header.base_index,
                header.base_sequence,
            ))
        } else {
            None
        };

        let mut record = MftRecord {
            segment,
            header,
            base,
            children: Vec::new(),
            attributes: Vec::new(),
            parsed: false,
            callback_called: false,
            fetched_refs: HashSet::new(),
        };

        record.walk_attributes(data)?;
        record.parsed = true;
        Ok(record)
    }

    /// Walk the variable-length attribute chain. Terminates at the end
    /// sentinel, rejects lengths that step past the record's used bytes
    fn walk_attributes(&mut self, data: &[u8]) -> Result<(), NtfsError> {
        let used_size = std::cmp::min(self.header.used_size as usize, data.len());
        let mut offset = self.header.first_attribute_offset as usize;
        let header_min = 16;
        let end_sentinel = 0xffffffff;

        loop {
            if offset + 4 > used_size {
                break;
            }
            let type_code = u32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            if type_code == end_sentinel {
                break;
            }
            if offset + header_min > used_size {
                return Err(NtfsError::AttributeOverflow);
            }
            let size = u32::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
            ]) as usize;
            if size < header_min || offset + size > used_size {
                return Err(NtfsError::AttributeOverflow);
            }

            let attr_data = &data[offset..offset + size];
            match self.parse_attribute(attr_data) {
                Ok(attribute) => self.attributes.push(attribute),
                Err(NtfsError::UnknownAttributeForm) => {
                    return Err(NtfsError::UnknownAttributeForm)
                }
                Err(err) => {
                    warn!(
                        "[ntfs] Skipping undecodable attribute {type_code:#x} in record {}: {err:?}",
                        self.segment
                    );
                }
            }
            offset += size;
        }

        Ok(())
    }

    /// Classify one attribute and materialize its typed view
    fn parse_attribute(&mut self, attr_data: &[u8]) -> Result<MftAttribute, NtfsError> {
        let header_result = AttributeHeader::parse_header(attr_data);
        let header = match header_result {
            Ok((_, result)) => result,
            Err(_err) => return Err(NtfsError::Truncated),
        };

        let value = match header.form {
            ResidentFlag::Resident => {
                let resident = match &header.resident {
                    Some(result) => result,
                    None => return Err(NtfsError::UnknownAttributeForm),
                };
                let start = resident.value_offset as usize;
                let end = start + resident.value_size as usize;
                if end > attr_data.len() {
                    return Err(NtfsError::Truncated);
                }
                let value_data = &attr_data[start..end];
                MftRecord::resident_value(&header, value_data)?
            }
            ResidentFlag::NonResident => {
                let non_resident = match &header.non_resident {
                    Some(result) => result,
                    None => return Err(NtfsError::UnknownAttributeForm),
                };
                let start = non_resident.run_list_offset as usize;
                if start > attr_data.len() {
                    return Err(NtfsError::Truncated);
                }
                let runs_result = parse_run_list(&attr_data[start..], non_resident.first_vcn);
                let extents = match runs_result {
                    Ok((_, result)) => result,
                    Err(_err) => return Err(NtfsError::BadRun),
                };
                let stream = DataAttribute {
                    name: header.name.clone(),
                    instance: header.instance,
                    resident: None,
                    extents,
                    data_size: non_resident.data_size,
                    allocated_size: non_resident.allocated_size,
                    valid_size: non_resident.valid_size,
                    compression_unit: non_resident.compression_unit,
                    flags: header.data_flags.clone(),
                    first_vcn: non_resident.first_vcn,
                    last_vcn: non_resident.last_vcn,
                };
                match header.attrib_type {
                    AttributeType::AttributeList => AttributeValue::ListNonResident(stream),
                    AttributeType::IndexAllocation => AttributeValue::IndexAllocation(stream),
                    AttributeType::Bitmap => AttributeValue::Bitmap(stream),
                    AttributeType::Ea => AttributeValue::Ea(stream),
                    _ => AttributeValue::Data(stream),
                }
            }
        };

        Ok(MftAttribute { header, value })
    }

    fn resident_value(
        header: &AttributeHeader,
        value_data: &[u8],
    ) -> Result<AttributeValue, NtfsError> {
        let value = match header.attrib_type {
            AttributeType::StandardInformation => {
                match StandardInfo::parse_standard_info(value_data) {
                    Ok((_, result)) => AttributeValue::Standard(result),
                    Err(_err) => return Err(NtfsError::Truncated),
                }
            }
            AttributeType::FileName => match FileName::parse_filename(value_data) {
                Ok((_, result)) => AttributeValue::FileName(result),
                Err(_err) => return Err(NtfsError::Truncated),
            },
            AttributeType::AttributeList => match AttributeListEntry::parse_list(value_data) {
                Ok((_, result)) => AttributeValue::List(result),
                Err(_err) => return Err(NtfsError::Truncated),
            },
            AttributeType::IndexRoot => match IndexRoot::parse_root(value_data) {
                Ok((_, result)) => AttributeValue::IndexRoot(result),
                Err(_err) => return Err(NtfsError::Truncated),
            },
            AttributeType::EaInformation => {
                match EaInformation::parse_ea_information(value_data) {
                    Ok((_, result)) => AttributeValue::EaInformation(result),
                    Err(_err) => return Err(NtfsError::Truncated),
                }
            }
            AttributeType::ObjectId => match ObjectId::parse_object_id(value_data) {
                Ok((_, result)) => AttributeValue::ObjectId(result),
                Err(_err) => return Err(NtfsError::Truncated),
            },
            AttributeType::ReparsePoint => match ReparsePoint::parse_reparse(value_data) {
                Ok((_, result)) => AttributeValue::Reparse(result),
                Err(_err) => return Err(NtfsError::Truncated),
            },
            AttributeType::Data
            | AttributeType::Bitmap
            | AttributeType::Ea
            | AttributeType::LoggedUtilityStream => {
                let stream = DataAttribute {
                    name: header.name.clone(),
                    instance: header.instance,
                    resident: Some(value_data.to_vec()),
                    extents: Vec::new(),
                    data_size: value_data.len() as u64,
                    allocated_size: value_data.len() as u64,
                    valid_size: value_data.len() as u64,
                    compression_unit: 0,
                    flags: header.data_flags.clone(),
                    first_vcn: 0,
                    last_vcn: 0,
                };
                match header.attrib_type {
                    AttributeType::Bitmap => AttributeValue::Bitmap(stream),
                    AttributeType::Ea => AttributeValue::Ea(stream),
                    _ => AttributeValue::Data(stream),
                }
            }
            _ => AttributeValue::Other(value_data.to_vec()),
        };
        Ok(value)
    }

    pub fn in_use(&self) -> bool {
        self.header.is_in_use()
    }

    /// Directory membership: the record owns a resident $INDEX_ROOT named
    /// $I30. The raw header flag is not consulted, a reused slot can still
    /// carry it after the index itself is gone
    pub fn is_directory(&self) -> bool {
        self.attributes.iter().any(|attr| {
            attr.header.attrib_type == AttributeType::IndexRoot && attr.header.name == "$I30"
        })
    }

    pub fn sequence(&self) -> u16 {
        self.header.sequence
    }

    pub fn standard_info(&self) -> Option<&StandardInfo> {
        self.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::Standard(info) => Some(info),
            _ => None,
        })
    }

    pub fn file_names(&self) -> Vec<&FileName> {
        self.attributes
            .iter()
            .filter_map(|attr| match &attr.value {
                AttributeValue::FileName(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Preferred display name: first non-DOS name, else any name
    pub fn primary_name(&self) -> Option<&FileName> {
        let names = self.file_names();
        names
            .iter()
            .find(|name| !name.is_dos())
            .copied()
            .or(names.first().copied())
    }

    pub fn data_attributes(&self) -> Vec<&MftAttribute> {
        self.attributes
            .iter()
            .filter(|attr| matches!(attr.value, AttributeValue::Data(_)))
            .collect()
    }

    pub(crate) fn attribute_list(&self) -> Option<&Vec<AttributeListEntry>> {
        self.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::List(entries) => Some(entries),
            _ => None,
        })
    }

    pub(crate) fn attribute_list_mut(&mut self) -> Option<&mut Vec<AttributeListEntry>> {
        self.attributes
            .iter_mut()
            .find_map(|attr| match &mut attr.value {
                AttributeValue::List(entries) => Some(entries),
                _ => None,
            })
    }

    /// Non-resident $ATTRIBUTE_LIST carrier awaiting a volume read
    pub(crate) fn unresolved_list(&self) -> Option<&DataAttribute> {
        self.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::ListNonResident(stream) => Some(stream),
            _ => None,
        })
    }

    /// Replace a non-resident $ATTRIBUTE_LIST with its parsed entries
    pub(crate) fn resolve_list(&mut self, entries: Vec<AttributeListEntry>) {
        for attr in self.attributes.iter_mut() {
            if matches!(attr.value, AttributeValue::ListNonResident(_)) {
                attr.value = AttributeValue::List(entries);
                return;
            }
        }
    }

    pub fn index_root(&self) -> Option<&IndexRoot> {
        self.attributes.iter().find_map(|attr| match &attr.value {
            AttributeValue::IndexRoot(root) if attr.header.name == "$I30" => Some(root),
            _ => None,
        })
    }
}
