use crate::utils::encoding::base64_encode_standard;
use log::warn;

/// Get a UTF16 string from provided bytes data
pub(crate) fn extract_utf16_string(data: &[u8]) -> String {
    let mut utf16_data: Vec<u16> = Vec::new();
    let min_byte_size = 2;
    for wide_char in data.chunks(min_byte_size) {
        if wide_char.len() < min_byte_size {
            break;
        }
        utf16_data.push(u16::from_le_bytes([wide_char[0], wide_char[1]]));
    }

    // Windows uses UTF16
    let utf16_result = String::from_utf16(&utf16_data);
    match utf16_result {
        Ok(results) => results.trim_end_matches('\0').to_string(),
        Err(err) => {
            warn!("[strings] Failed to get UTF16 string: {err:?}");

            let max_size = 2097152;
            let issue = if data.len() < max_size {
                base64_encode_standard(data)
            } else {
                format!("Binary data size larger than 2MB, size: {}", data.len())
            };
            format!("Failed to get UTF16: {issue}")
        }
    }
}

/// Get a UTF8 string from provided bytes data
pub(crate) fn extract_utf8_string(data: &[u8]) -> String {
    let utf8_result = String::from_utf8(data.to_vec());
    match utf8_result {
        Ok(result) => result.trim_end_matches('\0').to_string(),
        Err(err) => {
            warn!("[strings] Failed to get UTF8 string: {err:?}");
            base64_encode_standard(data)
        }
    }
}

/// Compare strings the way Windows compares names: ASCII characters fold case,
/// everything else must match exactly
pub(crate) fn caseless_eq(input1: &str, input2: &str) -> bool {
    input1.eq_ignore_ascii_case(input2)
}

/// Check if `input` starts with `prefix` under Windows ASCII case folding
pub(crate) fn caseless_starts_with(input: &str, prefix: &str) -> bool {
    if prefix.len() > input.len() {
        return false;
    }
    input
        .as_bytes()
        .iter()
        .zip(prefix.as_bytes())
        .all(|(a, b)| a.eq_ignore_ascii_case(b))
}
