use super::{
    attributes::data::{DataAttribute, NonResidentExtent},
    error::NtfsError,
    uncompress::decompress_lznt1,
};
use crate::filesystem::volume::VolumeReader;
use log::error;

/// Where a seek is measured from
#[derive(Debug, Clone, Copy)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Random-access byte view over one stream-backed attribute. Resident values
/// read inline; non-resident values translate file offsets through the
/// extent list, zero-fill sparse runs, and decompress LZNT1 units
pub struct DataStream<'a> {
    attr: &'a DataAttribute,
    cluster_size: u64,
    pos: u64,
    /// Last decompressed compression unit, reads are usually sequential
    cached_unit: Option<(u64, Vec<u8>)>,
}

impl<'a> DataStream<'a> {
    pub fn new(attr: &'a DataAttribute, cluster_size: u32) -> DataStream<'a> {
        DataStream {
            attr,
            cluster_size: cluster_size as u64,
            pos: 0,
            cached_unit: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.attr.size()
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, NtfsError> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos as i64,
            Whence::End => self.size() as i64,
        };
        let target = base + offset;
        if target < 0 {
            return Err(NtfsError::Io);
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Read at the current position, clamped to the stream size. Returns
    /// bytes read, zero at end of stream
    pub fn read(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<usize, NtfsError> {
        let size = self.size();
        if self.pos >= size {
            return Ok(0);
        }
        let remaining = (size - self.pos) as usize;
        let want = std::cmp::min(buf.len(), remaining);
        if want == 0 {
            return Ok(0);
        }

        let read = if let Some(resident) = &self.attr.resident {
            let start = self.pos as usize;
            buf[..want].copy_from_slice(&resident[start..start + want]);
            want
        } else if self.attr.compression_unit != 0 {
            self.read_compressed(reader, &mut buf[..want])?
        } else {
            self.read_extents(reader, &mut buf[..want])?
        };

        self.pos += read as u64;
        Ok(read)
    }

    /// Non-resident plain read: walk the extent list run by run
    fn read_extents(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<usize, NtfsError> {
        let mut done = 0;
        while done < buf.len() {
            let offset = self.pos + done as u64;
            let vcn = offset / self.cluster_size;
            let within = offset % self.cluster_size;

            let extent = match self.find_extent(vcn) {
                Some(result) => result,
                // Past the last run but inside data_size: implicit sparse tail
                None => {
                    for byte in buf[done..].iter_mut() {
                        *byte = 0;
                    }
                    done = buf.len();
                    break;
                }
            };

            let clusters_in = vcn - extent.vcn_start;
            let extent_remaining =
                (extent.clusters - clusters_in) * self.cluster_size - within;
            let chunk = std::cmp::min(extent_remaining as usize, buf.len() - done);

            match extent.lcn {
                Some(lcn) => {
                    let disk_offset = (lcn + clusters_in) * self.cluster_size + within;
                    let read_result = reader.read_at(disk_offset, &mut buf[done..done + chunk]);
                    let bytes = match read_result {
                        Ok(result) => result,
                        Err(err) => {
                            error!("[ntfs] Stream read at {disk_offset} failed: {err:?}");
                            return Err(NtfsError::Io);
                        }
                    };
                    if bytes < chunk {
                        return Err(NtfsError::Truncated);
                    }
                }
                None => {
                    for byte in buf[done..done + chunk].iter_mut() {
                        *byte = 0;
                    }
                }
            }
            done += chunk;
        }
        Ok(done)
    }

    /// Compressed read: materialize whole compression units, LZNT1-decoded
    /// when the unit ends short on disk
    fn read_compressed(
        &mut self,
        reader: &mut dyn VolumeReader,
        buf: &mut [u8],
    ) -> Result<usize, NtfsError> {
        let unit_clusters = 1u64 << self.attr.compression_unit;
        let unit_size = unit_clusters * self.cluster_size;

        let mut done = 0;
        while done < buf.len() {
            let offset = self.pos + done as u64;
            let unit_index = offset / unit_size;
            let within = (offset % unit_size) as usize;

            let unit = self.load_unit(reader, unit_index, unit_clusters, unit_size)?;
            let available = unit.len().saturating_sub(within);
            if available == 0 {
                break;
            }
            let chunk = std::cmp::min(available, buf.len() - done);
            buf[done..done + chunk].copy_from_slice(&unit[within..within + chunk]);
            done += chunk;
        }
        Ok(done)
    }

    fn load_unit(
        &mut self,
        reader: &mut dyn VolumeReader,
        unit_index: u64,
        unit_clusters: u64,
        unit_size: u64,
    ) -> Result<&Vec<u8>, NtfsError> {
        let cached_hit = matches!(&self.cached_unit, Some((index, _)) if *index == unit_index);
        if cached_hit {
            return match &self.cached_unit {
                Some((_, unit)) => Ok(unit),
                None => Err(NtfsError::Io),
            };
        }

        let first_vcn = unit_index * unit_clusters;
        let mut allocated = Vec::new();
        let mut allocated_clusters = 0;
        let mut sparse_seen = false;

        for vcn in first_vcn..first_vcn + unit_clusters {
            match self.find_extent(vcn) {
                Some(extent) => match extent.lcn {
                    Some(lcn) => {
                        if sparse_seen {
                            // Allocated run after a hole inside one unit
                            return Err(NtfsError::BadRun);
                        }
                        let clusters_in = vcn - extent.vcn_start;
                        let disk_offset = (lcn + clusters_in) * self.cluster_size;
                        let start = allocated.len();
                        allocated.resize(start + self.cluster_size as usize, 0);
                        let read_result =
                            reader.read_at(disk_offset, &mut allocated[start..]);
                        match read_result {
                            Ok(bytes) => {
                                if bytes < self.cluster_size as usize {
                                    return Err(NtfsError::Truncated);
                                }
                            }
                            Err(err) => {
                                error!("[ntfs] Compressed unit read failed: {err:?}");
                                return Err(NtfsError::Io);
                            }
                        }
                        allocated_clusters += 1;
                    }
                    None => sparse_seen = true,
                },
                None => sparse_seen = true,
            }
        }

        let unit = if allocated_clusters == 0 {
            // Entirely sparse unit
            vec![0u8; unit_size as usize]
        } else if allocated_clusters == unit_clusters {
            // Fully allocated: stored uncompressed
            allocated
        } else {
            // Short on disk: LZNT1 compressed
            let mut decompressed = Vec::with_capacity(unit_size as usize);
            decompress_lznt1(&allocated, &mut decompressed)?;
            decompressed.resize(unit_size as usize, 0);
            decompressed
        };

        self.cached_unit = Some((unit_index, unit));
        match &self.cached_unit {
            Some((_, unit)) => Ok(unit),
            None => Err(NtfsError::Io),
        }
    }

    fn find_extent(&self, vcn: u64) -> Option<&NonResidentExtent> {
        self.attr
            .extents
            .iter()
            .find(|extent| vcn >= extent.vcn_start && vcn < extent.vcn_start + extent.clusters)
    }
}

/// Read a whole stream-backed attribute into memory
pub(crate) fn read_all(
    reader: &mut dyn VolumeReader,
    cluster_size: u32,
    attr: &DataAttribute,
) -> Result<Vec<u8>, NtfsError> {
    let mut stream = DataStream::new(attr, cluster_size);
    let mut data = Vec::with_capacity(stream.size() as usize);
    let chunk_size = 65536;
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let bytes = stream.read(reader, &mut chunk)?;
        if bytes == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..bytes]);
    }
    Ok(data)
}
