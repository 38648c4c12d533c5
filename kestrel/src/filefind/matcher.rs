use crate::filesystem::volume::VolumeReader;
use crate::ntfs::{
    attributes::data::DataAttribute,
    error::NtfsError,
    stream::{DataStream, Whence},
};
use log::error;

/// Boyer-Moore-Horspool byte search. The skip table is built once per term
/// and reused across every stream it is tested against
#[derive(Debug, Clone)]
pub(crate) struct BoyerMoore {
    needle: Vec<u8>,
    skip: [usize; 256],
}

impl BoyerMoore {
    pub(crate) fn new(needle: &[u8]) -> BoyerMoore {
        let mut skip = [needle.len(); 256];
        for (index, byte) in needle.iter().enumerate().take(needle.len().saturating_sub(1)) {
            skip[*byte as usize] = needle.len() - 1 - index;
        }
        BoyerMoore {
            needle: needle.to_vec(),
            skip,
        }
    }

    pub(crate) fn find(&self, haystack: &[u8]) -> Option<usize> {
        let needle_len = self.needle.len();
        if needle_len == 0 || haystack.len() < needle_len {
            return None;
        }

        let mut position = 0;
        while position + needle_len <= haystack.len() {
            if haystack[position..position + needle_len] == self.needle[..] {
                return Some(position);
            }
            let last = haystack[position + needle_len - 1];
            position += self.skip[last as usize];
        }
        None
    }

    /// Search a whole data stream in 4 MiB chunks. The chunks overlap by
    /// the needle length so a match straddling a chunk boundary is found
    pub(crate) fn search_stream(
        &self,
        reader: &mut dyn VolumeReader,
        attr: &DataAttribute,
        cluster_size: u32,
    ) -> Result<bool, NtfsError> {
        let needle_len = self.needle.len();
        if needle_len == 0 {
            return Ok(false);
        }

        let chunk_size = 4194304;
        let mut stream = DataStream::new(attr, cluster_size);
        let mut buf = vec![0u8; chunk_size + needle_len];
        let mut offset: u64 = 0;

        loop {
            stream.seek(offset as i64, Whence::Start)?;
            let mut filled = 0;
            while filled < buf.len() {
                let bytes = stream.read(reader, &mut buf[filled..])?;
                if bytes == 0 {
                    break;
                }
                filled += bytes;
            }
            if filled < needle_len {
                return Ok(false);
            }
            if self.find(&buf[..filled]).is_some() {
                return Ok(true);
            }
            if filled < buf.len() {
                // Stream exhausted
                return Ok(false);
            }
            // Step one chunk, keep needle_len bytes of overlap
            offset += chunk_size as u64;
        }
    }
}

/// Read exactly `length` bytes from offset zero of a stream. Short streams
/// return None
pub(crate) fn read_header(
    reader: &mut dyn VolumeReader,
    attr: &DataAttribute,
    cluster_size: u32,
    length: usize,
) -> Option<Vec<u8>> {
    if attr.size() < length as u64 {
        return None;
    }
    let mut stream = DataStream::new(attr, cluster_size);
    let mut header = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        let bytes_result = stream.read(reader, &mut header[filled..]);
        let bytes = match bytes_result {
            Ok(result) => result,
            Err(err) => {
                error!("[filefind] Could not read stream header: {err:?}");
                return None;
            }
        };
        if bytes == 0 {
            return None;
        }
        filled += bytes;
    }
    Some(header)
}
