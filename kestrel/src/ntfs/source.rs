use super::{
    attributes::data::NonResidentExtent,
    error::NtfsError,
    fixup::Fixup,
    header::FileRecordHeader,
    record::{AttributeValue, MftRecord},
    segment::{SafeSegmentNumber, SegmentReference},
};
use crate::filesystem::volume::VolumeReader;
use log::{error, warn};

/// Produces the stream of raw MFT records for one volume. `next_record`
/// pulls records in source order; `fetch_records` is the targeted path the
/// walker uses during completeness repair
pub trait MftSource {
    fn record_count(&self) -> u64;

    /// The volume root directory segment. Record 5 with its own sequence
    fn root_segment(&self) -> SafeSegmentNumber;

    /// Read the next record into `buf` (bytes_per_frs sized). Returns the
    /// record index, or None when the source is exhausted
    fn next_record(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<Option<u64>, NtfsError>;

    /// Targeted fetch of specific records. Sources that cannot seek answer
    /// `NtfsError::NotSupported` and the walker degrades gracefully
    fn fetch_records(
        &mut self,
        reader: &mut dyn VolumeReader,
        refs: &[SegmentReference],
    ) -> Result<Vec<(u64, Vec<u8>)>, NtfsError>;
}

/// Sequential reader over an exported $MFT dump. Record N lives at byte
/// offset N * bytes_per_frs, so targeted fetch is plain arithmetic
pub struct OfflineMftSource {
    record_count: u64,
    next_index: u64,
    root_sequence: u16,
}

impl OfflineMftSource {
    pub fn new(record_count: u64) -> OfflineMftSource {
        OfflineMftSource {
            record_count,
            next_index: 0,
            root_sequence: 5,
        }
    }

    fn read_record(
        reader: &mut dyn VolumeReader,
        index: u64,
        buf: &mut [u8],
    ) -> Result<usize, NtfsError> {
        let offset = index * reader.bytes_per_frs() as u64;
        let read_result = reader.read_at(offset, buf);
        match read_result {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                error!("[ntfs] Could not read record {index} from MFT dump: {err:?}");
                Err(NtfsError::Io)
            }
        }
    }
}

impl MftSource for OfflineMftSource {
    fn record_count(&self) -> u64 {
        self.record_count
    }

    fn root_segment(&self) -> SafeSegmentNumber {
        let root_index = 5;
        SafeSegmentNumber::new(root_index, self.root_sequence)
    }

    fn next_record(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<Option<u64>, NtfsError> {
        if self.next_index >= self.record_count {
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;

        let bytes = OfflineMftSource::read_record(reader, index, buf)?;
        if bytes < buf.len() {
            return Ok(None);
        }
        Ok(Some(index))
    }

    fn fetch_records(
        &mut self,
        reader: &mut dyn VolumeReader,
        refs: &[SegmentReference],
    ) -> Result<Vec<(u64, Vec<u8>)>, NtfsError> {
        let mut records = Vec::new();
        for reference in refs {
            let index = reference.index();
            if index >= self.record_count {
                warn!("[ntfs] Fetch of record {index} past the end of the dump");
                continue;
            }
            let mut buf = vec![0u8; reader.bytes_per_frs() as usize];
            let bytes = OfflineMftSource::read_record(reader, index, &mut buf)?;
            if bytes == buf.len() {
                records.push((index, buf));
            }
        }
        Ok(records)
    }
}

/// Reads $MFT through the volume's own cluster runs. Bootstraps from the
/// $MFT base record at the LCN named by the boot sector
pub struct OnlineMftSource {
    extents: Vec<NonResidentExtent>,
    mft_size: u64,
    record_count: u64,
    next_index: u64,
    root_sequence: u16,
}

impl OnlineMftSource {
    /// Read record 0 at `mft_start_lcn`, parse its unnamed $DATA run list,
    /// and use those runs to address every other record
    pub fn initialize(
        reader: &mut dyn VolumeReader,
        mft_start_lcn: u64,
    ) -> Result<OnlineMftSource, NtfsError> {
        let bytes_per_frs = reader.bytes_per_frs() as usize;
        let mut buf = vec![0u8; bytes_per_frs];
        let offset = mft_start_lcn * reader.cluster_size() as u64;
        let read_result = reader.read_at(offset, &mut buf);
        match read_result {
            Ok(bytes) => {
                if bytes < bytes_per_frs {
                    error!("[ntfs] Short read of the $MFT base record");
                    return Err(NtfsError::Io);
                }
            }
            Err(err) => {
                error!("[ntfs] Could not read the $MFT base record: {err:?}");
                return Err(NtfsError::Io);
            }
        }

        let header = FileRecordHeader::parse_header(&buf)?;
        let (_, fixup_values) = match Fixup::get_fixup(
            &buf[header.usa_offset as usize..],
            header.usa_count,
        ) {
            Ok(result) => result,
            Err(_err) => return Err(NtfsError::Truncated),
        };
        fixup_values.apply_fixup(&mut buf)?;

        let segment = header.safe_segment(0);
        let record = MftRecord::parse(segment, header, &buf)?;

        let mut extents = Vec::new();
        let mut mft_size = 0;
        for attribute in &record.data_attributes() {
            if let AttributeValue::Data(data) = &attribute.value {
                if data.is_unnamed() && !data.is_resident() {
                    extents = data.extents.clone();
                    mft_size = data.data_size;
                    break;
                }
            }
        }
        if extents.is_empty() {
            error!("[ntfs] $MFT record carries no non-resident unnamed $DATA");
            return Err(NtfsError::MissingReference);
        }

        let record_count = mft_size / bytes_per_frs as u64;
        Ok(OnlineMftSource {
            extents,
            mft_size,
            record_count,
            next_index: 0,
            root_sequence: 5,
        })
    }

    /// Translate a record index to its absolute volume offset through the
    /// $MFT run list
    fn record_offset(&self, reader: &dyn VolumeReader, index: u64) -> Option<u64> {
        let byte_offset = index * reader.bytes_per_frs() as u64;
        if byte_offset >= self.mft_size {
            return None;
        }
        let cluster_size = reader.cluster_size() as u64;
        let vcn = byte_offset / cluster_size;
        let within = byte_offset % cluster_size;

        for extent in &self.extents {
            if vcn >= extent.vcn_start && vcn < extent.vcn_start + extent.clusters {
                let lcn = extent.lcn?;
                let clusters_in = vcn - extent.vcn_start;
                return Some((lcn + clusters_in) * cluster_size + within);
            }
        }
        None
    }

    fn read_record(
        &self,
        reader: &mut dyn VolumeReader,
        index: u64,
        buf: &mut [u8],
    ) -> Result<bool, NtfsError> {
        let offset = match self.record_offset(reader, index) {
            Some(result) => result,
            None => return Ok(false),
        };
        let read_result = reader.read_at(offset, buf);
        match read_result {
            Ok(bytes) => Ok(bytes == buf.len()),
            Err(err) => {
                error!("[ntfs] Could not read record {index} at {offset}: {err:?}");
                Err(NtfsError::Io)
            }
        }
    }
}

impl MftSource for OnlineMftSource {
    fn record_count(&self) -> u64 {
        self.record_count
    }

    fn root_segment(&self) -> SafeSegmentNumber {
        let root_index = 5;
        SafeSegmentNumber::new(root_index, self.root_sequence)
    }

    fn next_record(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<Option<u64>, NtfsError> {
        while self.next_index < self.record_count {
            let index = self.next_index;
            self.next_index += 1;
            if self.read_record(reader, index, buf)? {
                return Ok(Some(index));
            }
            // Record fell inside a sparse $MFT run, skip it
            warn!("[ntfs] Record {index} is not addressable, skipping");
        }
        Ok(None)
    }

    fn fetch_records(
        &mut self,
        reader: &mut dyn VolumeReader,
        refs: &[SegmentReference],
    ) -> Result<Vec<(u64, Vec<u8>)>, NtfsError> {
        let mut records = Vec::new();
        for reference in refs {
            let index = reference.index();
            let mut buf = vec![0u8; reader.bytes_per_frs() as usize];
            if self.read_record(reader, index, &mut buf)? {
                records.push((index, buf));
            }
        }
        Ok(records)
    }
}
