use tracing::debug;

use crate::cipher::aes128_ecb_decrypt;
use crate::error::{NcmError, Result};

/// AES key for decrypting the RC4 key data.
pub(crate) const CORE_KEY: [u8; 16] = [
    0x68, 0x7A, 0x48, 0x52, 0x41, 0x6D, 0x73, 0x6F, 0x35, 0x6B, 0x49, 0x6E, 0x62, 0x61, 0x78, 0x57,
];

const KEY_XOR: u8 = 0x64;

/// Length of the "neteasecloudmusic" prefix in front of the audio key.
const KEY_PREFIX_LEN: usize = 17;

/// Unmask and decrypt the key blob, returning the raw audio key.
///
/// The result may be empty; [`crate::cipher::KeyBox::new`] rejects that.
pub(crate) fn recover_key(blob: &[u8]) -> Result<Vec<u8>> {
    let unmasked: Vec<u8> = blob.iter().map(|b| b ^ KEY_XOR).collect();
    let mut decrypted =
        aes128_ecb_decrypt(&CORE_KEY, &unmasked).map_err(|e| NcmError::Crypto(e.to_string()))?;
    if decrypted.len() < KEY_PREFIX_LEN {
        return Err(NcmError::Crypto(format!(
            "decrypted key is {} bytes, shorter than its {KEY_PREFIX_LEN}-byte prefix",
            decrypted.len()
        )));
    }
    let key = decrypted.split_off(KEY_PREFIX_LEN);
    debug!(len = key.len(), "recovered audio key");
    Ok(key)
}
