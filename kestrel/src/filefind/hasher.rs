use crate::filesystem::volume::VolumeReader;
use crate::ntfs::{attributes::data::DataAttribute, stream::DataStream};
use common::files::Hashes;
use log::error;
use md5::{Digest, Md5};
use sha1::Sha1;
use sha2::Sha256;

/// Stream one data attribute through the demanded digest pipelines. Only
/// the algorithms the active rule set mentions are computed
pub(crate) fn hash_stream(
    reader: &mut dyn VolumeReader,
    attr: &DataAttribute,
    cluster_size: u32,
    hash_data: &Hashes,
) -> (String, String, String) {
    let mut md5 = Md5::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();

    let mut stream = DataStream::new(attr, cluster_size);
    let buf_size = 65536;
    let mut buf = vec![0u8; buf_size];
    loop {
        let bytes_result = stream.read(reader, &mut buf);
        let bytes = match bytes_result {
            Ok(result) => result,
            Err(err) => {
                error!("[filefind] Failed to read data for hashing: {err:?}");
                break;
            }
        };
        if bytes == 0 {
            break;
        }

        if hash_data.md5 {
            md5.update(&buf[..bytes]);
        }
        if hash_data.sha1 {
            sha1.update(&buf[..bytes]);
        }
        if hash_data.sha256 {
            sha256.update(&buf[..bytes]);
        }
    }

    let mut md5_string = String::new();
    let mut sha1_string = String::new();
    let mut sha256_string = String::new();

    if hash_data.md5 {
        let hash = md5.finalize();
        md5_string = format!("{hash:x}");
    }
    if hash_data.sha1 {
        let hash = sha1.finalize();
        sha1_string = format!("{hash:x}");
    }
    if hash_data.sha256 {
        let hash = sha256.finalize();
        sha256_string = format!("{hash:x}");
    }

    (md5_string, sha1_string, sha256_string)
}

#[cfg(test)]
mod tests {
    use super::hash_stream;
    use crate::filesystem::volume::BufferReader;
    use crate::ntfs::attributes::data::DataAttribute;
    use common::files::Hashes;

    fn resident_attr(data: &[u8]) -> DataAttribute {
        DataAttribute {
            name: String::new(),
            instance: 0,
            resident: Some(data.to_vec()),
            extents: Vec::new(),
            data_size: data.len() as u64,
            allocated_size: data.len() as u64,
            valid_size: data.len() as u64,
            compression_unit: 0,
            flags: Vec::new(),
            first_vcn: 0,
            last_vcn: 0,
        }
    }

    #[test]
    fn test_hash_stream() {
        let attr = resident_attr(b"");
        let mut reader = BufferReader::new(Vec::new(), 1024, 4096);
        let hashes = Hashes {
            md5: true,
            sha1: true,
            sha256: true,
        };

        let (md5, sha1, sha256) = hash_stream(&mut reader, &attr, 4096, &hashes);
        assert_eq!(md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(sha1, "da39a3ee5e6b4b0d3255bfef95601890afd80709");
        assert_eq!(
            sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash_stream_demand() {
        let attr = resident_attr(b"kestrel");
        let mut reader = BufferReader::new(Vec::new(), 1024, 4096);
        let hashes = Hashes {
            md5: true,
            sha1: false,
            sha256: false,
        };

        let (md5, sha1, sha256) = hash_stream(&mut reader, &attr, 4096, &hashes);
        assert_eq!(md5.is_empty(), false);
        assert_eq!(sha1, "");
        assert_eq!(sha256, "");
    }
}
