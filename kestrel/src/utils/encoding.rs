use base64::{engine::general_purpose, Engine};

/// Base64 encode data using the STANDARD engine
pub(crate) fn base64_encode_standard(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}
