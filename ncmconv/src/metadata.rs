use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;

use crate::cipher::aes128_ecb_decrypt;
use crate::error::MetadataError;

/// AES key for decrypting the metadata.
pub(crate) const META_KEY: [u8; 16] = [
    0x23, 0x31, 0x34, 0x6C, 0x6A, 0x6B, 0x5F, 0x21, 0x5C, 0x5D, 0x26, 0x30, 0x55, 0x3C, 0x27, 0x28,
];

/// ASCII tag in front of the base64 text.
pub(crate) const META_TAG: &[u8; 22] = b"163 key(Don't modify):";
const MUSIC_PREFIX_LEN: usize = b"music:".len();
const META_XOR: u8 = 0x63;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NcmMetadata {
    #[serde(rename = "musicName")]
    pub music_name: String,
    pub album: String,
    pub artist: Vec<Vec<serde_json::Value>>,
    pub bitrate: u64,
    pub duration: u64,
    pub format: String,
}

impl NcmMetadata {
    /// Recover metadata from the raw blob as stored in the container.
    ///
    /// Blobs written by the desktop client are additionally masked with `0x63`;
    /// those are recognised by their masked tag and unmasked first.
    pub fn from_blob(blob: &[u8]) -> Result<Self, MetadataError> {
        if blob.len() < META_TAG.len() {
            return Err(MetadataError::TooShort(blob.len()));
        }
        let unmasked: Vec<u8>;
        let blob = if is_masked(blob) {
            debug!("metadata blob is 0x63-masked");
            unmasked = blob.iter().map(|b| b ^ META_XOR).collect();
            &unmasked[..]
        } else {
            blob
        };

        let decoded = BASE64.decode(&blob[META_TAG.len()..])?;
        let decrypted = aes128_ecb_decrypt(&META_KEY, &decoded)
            .map_err(|e| MetadataError::Cipher(e.to_string()))?;
        if decrypted.len() < MUSIC_PREFIX_LEN {
            return Err(MetadataError::TooShort(decrypted.len()));
        }
        Self::from_decrypted(&decrypted[MUSIC_PREFIX_LEN..])
    }

    /// Parse metadata from the decrypted JSON bytes (after "music:" prefix is stripped).
    pub fn from_decrypted(data: &[u8]) -> Result<Self, MetadataError> {
        let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(serde_json::from_slice(&data[..end])?)
    }

    /// Join artist names with " / ".
    pub fn artist_names(&self) -> String {
        self.artist
            .iter()
            .filter_map(|a| a.first().and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

fn is_masked(blob: &[u8]) -> bool {
    blob.iter()
        .zip(META_TAG)
        .all(|(&b, &tag)| b ^ META_XOR == tag)
}
