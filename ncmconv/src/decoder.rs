use std::io::Read;

use tracing::{debug, warn};

use crate::cipher::KeyBox;
use crate::container::Container;
use crate::error::Result;
use crate::key::recover_key;
use crate::metadata::NcmMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Flac,
}

impl AudioFormat {
    /// Map the metadata `format` field. Unknown values fall back to MP3.
    pub fn from_metadata(format: &str) -> Self {
        if format.trim().eq_ignore_ascii_case("flac") {
            Self::Flac
        } else {
            Self::Mp3
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
        }
    }
}

/// Parsed NCM file, ready for audio extraction.
pub struct NcmFile {
    pub metadata: Option<NcmMetadata>,
    pub cover_image: Option<Vec<u8>>,
    pub format: AudioFormat,
    key_box: KeyBox,
    audio: Vec<u8>,
}

impl NcmFile {
    /// Parse a whole NCM container from a reader. Call `into_audio` to decrypt.
    ///
    /// Metadata problems are logged and leave `metadata` empty; everything
    /// else is an error.
    pub fn parse<R: Read>(r: &mut R) -> Result<Self> {
        let container = Container::read(r)?;

        let audio_key = recover_key(&container.key_blob)?;
        let key_box = KeyBox::new(&audio_key)?;

        let metadata = if container.metadata_blob.is_empty() {
            debug!("no metadata in container");
            None
        } else {
            match NcmMetadata::from_blob(&container.metadata_blob) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("ignoring unreadable metadata: {e}");
                    None
                }
            }
        };
        let format = metadata
            .as_ref()
            .map_or(AudioFormat::Mp3, |m| AudioFormat::from_metadata(&m.format));

        let cover_image = Some(container.cover_image).filter(|img| !img.is_empty());

        Ok(Self {
            metadata,
            cover_image,
            format,
            key_box,
            audio: container.payload,
        })
    }

    /// Length of the audio payload, which is also the decoded length.
    pub fn audio_len(&self) -> usize {
        self.audio.len()
    }

    /// Decrypt the audio payload in place and hand it over.
    pub fn into_audio(mut self) -> Vec<u8> {
        self.key_box.apply(&mut self.audio);
        self.audio
    }
}
