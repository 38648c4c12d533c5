use super::error::FileSystemError;
use log::error;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

/// Random-access view of one NTFS volume. The walker and the data stream
/// facade only talk to a volume through this contract; VSS snapshots, mounted
/// disks, and loop-mounted images all live behind it.
pub trait VolumeReader {
    /// Bytes per file record segment (typically 1024)
    fn bytes_per_frs(&self) -> u32;
    fn bytes_per_sector(&self) -> u32;
    fn cluster_size(&self) -> u32;
    fn volume_serial(&self) -> u64;
    /// Snapshot GUID when reading a VSS snapshot
    fn snapshot_id(&self) -> Option<String>;
    /// Maximum path component length, used for path buffer sizing
    fn max_component_length(&self) -> u32;
    /// Read bytes at an absolute byte offset. Returns bytes read
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, FileSystemError>;
}

/// Fixed geometry describing one volume, captured once at walk start so
/// callbacks can see it without borrowing the reader
#[derive(Debug, Clone)]
pub struct VolumeMeta {
    pub bytes_per_frs: u32,
    pub bytes_per_sector: u32,
    pub cluster_size: u32,
    pub volume_serial: u64,
    pub snapshot_id: Option<String>,
}

impl VolumeMeta {
    pub fn from_reader(reader: &dyn VolumeReader) -> VolumeMeta {
        VolumeMeta {
            bytes_per_frs: reader.bytes_per_frs(),
            bytes_per_sector: reader.bytes_per_sector(),
            cluster_size: reader.cluster_size(),
            volume_serial: reader.volume_serial(),
            snapshot_id: reader.snapshot_id(),
        }
    }
}

/// Reader over an exported $MFT dump file. Offsets are relative to the dump,
/// there is no surrounding volume to address
pub struct OfflineMftReader {
    file: File,
    bytes_per_frs: u32,
    serial: u64,
}

impl OfflineMftReader {
    pub fn new(path: &str, bytes_per_frs: u32) -> Result<OfflineMftReader, FileSystemError> {
        let file_result = File::open(path);
        let file = match file_result {
            Ok(result) => result,
            Err(err) => {
                error!("[volume] Could not open MFT dump {path}: {err:?}");
                return Err(FileSystemError::OpenFile);
            }
        };
        Ok(OfflineMftReader {
            file,
            bytes_per_frs,
            serial: 0,
        })
    }

    pub fn record_count(&self) -> u64 {
        match self.file.metadata() {
            Ok(meta) => meta.len() / self.bytes_per_frs as u64,
            Err(_err) => 0,
        }
    }
}

impl VolumeReader for OfflineMftReader {
    fn bytes_per_frs(&self) -> u32 {
        self.bytes_per_frs
    }

    fn bytes_per_sector(&self) -> u32 {
        512
    }

    fn cluster_size(&self) -> u32 {
        4096
    }

    fn volume_serial(&self) -> u64 {
        self.serial
    }

    fn snapshot_id(&self) -> Option<String> {
        None
    }

    fn max_component_length(&self) -> u32 {
        255
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, FileSystemError> {
        if self.file.seek(SeekFrom::Start(offset)).is_err() {
            return Err(FileSystemError::SeekFile);
        }
        let mut total = 0;
        while total < buf.len() {
            let bytes = match self.file.read(&mut buf[total..]) {
                Ok(result) => result,
                Err(err) => {
                    error!("[volume] Could not read MFT dump at {offset}: {err:?}");
                    return Err(FileSystemError::ReadFile);
                }
            };
            if bytes == 0 {
                break;
            }
            total += bytes;
        }
        Ok(total)
    }
}

/// In-memory volume image. Used by tests and by callers that already hold the
/// raw bytes of a small volume
pub struct BufferReader {
    data: Vec<u8>,
    bytes_per_frs: u32,
    bytes_per_sector: u32,
    cluster_size: u32,
    serial: u64,
    snapshot: Option<String>,
}

impl BufferReader {
    pub fn new(data: Vec<u8>, bytes_per_frs: u32, cluster_size: u32) -> BufferReader {
        BufferReader {
            data,
            bytes_per_frs,
            bytes_per_sector: 512,
            cluster_size,
            serial: 0,
            snapshot: None,
        }
    }

    pub fn with_serial(mut self, serial: u64) -> BufferReader {
        self.serial = serial;
        self
    }

    pub fn with_snapshot(mut self, snapshot: &str) -> BufferReader {
        self.snapshot = Some(snapshot.to_string());
        self
    }
}

impl VolumeReader for BufferReader {
    fn bytes_per_frs(&self) -> u32 {
        self.bytes_per_frs
    }

    fn bytes_per_sector(&self) -> u32 {
        self.bytes_per_sector
    }

    fn cluster_size(&self) -> u32 {
        self.cluster_size
    }

    fn volume_serial(&self) -> u64 {
        self.serial
    }

    fn snapshot_id(&self) -> Option<String> {
        self.snapshot.clone()
    }

    fn max_component_length(&self) -> u32 {
        255
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, FileSystemError> {
        if offset >= self.data.len() as u64 {
            return Ok(0);
        }
        let start = offset as usize;
        let end = std::cmp::min(start + buf.len(), self.data.len());
        let count = end - start;
        buf[..count].copy_from_slice(&self.data[start..end]);
        Ok(count)
    }
}
