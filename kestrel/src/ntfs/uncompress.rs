use super::error::NtfsError;
use log::warn;

/// Decompress an LZNT1 compressed buffer. NTFS compressed data attributes
/// store each compression unit as a chain of LZNT1 chunks
pub(crate) fn decompress_lznt1(in_buf: &[u8], out_buf: &mut Vec<u8>) -> Result<(), NtfsError> {
    let compressed_flag = 0x8000;
    let mut in_idx = 0;
    let mut out_idx = out_buf.len();

    while in_idx + 2 <= in_buf.len() {
        let header = u16::from_le_bytes([in_buf[in_idx], in_buf[in_idx + 1]]) as usize;
        let in_chunk_base = in_idx;
        in_idx += 2;

        if header == 0 {
            break;
        }
        let chunk_len = (header & 0xfff) + 1;
        if chunk_len > in_buf.len() - in_idx {
            warn!("[ntfs] LZNT1 chunk length {chunk_len} overruns input");
            return Err(NtfsError::BadRun);
        }

        if header & compressed_flag != 0 {
            let in_base_idx = in_idx;
            let out_base_idx = out_idx;

            let mut flag_bit = 0;
            let mut flags = in_buf[in_idx];
            in_idx += 1;

            while (in_idx - in_base_idx) < chunk_len {
                if in_idx >= in_buf.len() {
                    break;
                }

                if (flags & (1 << flag_bit)) == 0 {
                    // Literal byte
                    out_buf.push(in_buf[in_idx]);
                    out_idx += 1;
                    in_idx += 1;
                } else {
                    if in_idx + 2 > in_buf.len() || (in_idx - in_base_idx) >= chunk_len {
                        break;
                    }
                    let copy_token =
                        u16::from_le_bytes([in_buf[in_idx], in_buf[in_idx + 1]]) as usize;
                    in_idx += 2;

                    if out_idx == out_base_idx {
                        warn!("[ntfs] LZNT1 back reference with no output yet");
                        return Err(NtfsError::BadRun);
                    }

                    // Offset/length split shrinks as the chunk fills
                    let mut pos = out_idx - out_base_idx - 1;
                    let mut length_mask = 0xfff;
                    let mut offset_shift = 12;
                    while pos >= 0x10 {
                        length_mask >>= 1;
                        offset_shift -= 1;
                        pos >>= 1;
                    }

                    let length = (copy_token & length_mask) + 3;
                    let offset = (copy_token >> offset_shift) + 1;
                    if offset > out_idx {
                        warn!("[ntfs] LZNT1 back reference before output start");
                        return Err(NtfsError::BadRun);
                    }

                    for _ in 0..length {
                        out_buf.push(out_buf[out_idx - offset]);
                        out_idx += 1;
                    }
                }

                flag_bit = (flag_bit + 1) % 8;
                if flag_bit == 0 {
                    if (in_idx - in_base_idx) >= chunk_len {
                        break;
                    }
                    flags = in_buf[in_idx];
                    in_idx += 1;
                }
            }
        } else {
            // Chunk stored uncompressed
            out_buf.extend_from_slice(&in_buf[in_idx..in_idx + chunk_len]);
            out_idx += chunk_len;
        }

        in_idx = in_chunk_base + 2 + chunk_len;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::decompress_lznt1;
    use crate::ntfs::error::NtfsError;

    #[test]
    fn test_uncompressed_chunk() {
        // Header without the compressed flag, chunk stored as plain bytes
        let mut data = vec![0x04, 0x00];
        data.extend_from_slice(b"hello");
        let mut out = Vec::new();
        decompress_lznt1(&data, &mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_compressed_chunk_back_reference() {
        // 'abc' literals then a back reference copying 6 bytes from offset 3
        let data = [
            0x08, 0xb0, // compressed chunk, length 9
            0x08, // flags: fourth token is a copy
            b'a', b'b', b'c', 0x03, 0x20, // copy token: offset 3 length 6
            0x00, 0x00, 0x00,
        ];
        let mut out = Vec::new();
        decompress_lznt1(&data, &mut out).unwrap();
        assert_eq!(&out[0..9], b"abcabcabc");
    }

    #[test]
    fn test_bad_back_reference() {
        let data = [
            0x02, 0xb0, // compressed chunk
            0x01, // first token is a copy with nothing written yet
            0xff, 0xff,
        ];
        let mut out = Vec::new();
        let result = decompress_lznt1(&data, &mut out);
        assert_eq!(result.unwrap_err(), NtfsError::BadRun);
    }
}
