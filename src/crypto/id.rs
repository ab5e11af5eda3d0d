use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// The number of random bytes in a session key.
const SESSION_KEY_SIZE: usize = 32;

/// Generates a new random session key.
///
/// # Returns
///
/// 32 random bytes, base32-encoded (standard alphabet) without `=` padding.
pub fn generate_session_id() -> String {
    let mut key = [0u8; SESSION_KEY_SIZE];
    OsRng.fill_bytes(&mut key);

    BASE32_NOPAD.encode(&key)
}
