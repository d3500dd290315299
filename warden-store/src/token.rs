//! Opaque bearer token generation

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// 160 bits of entropy per token
const TOKEN_BYTES: usize = 20;

/// Length of every generated token once encoded
pub const TOKEN_LENGTH: usize = 27;

/// Generate a fresh random token from the operating system CSPRNG
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
