use std::io::Read;

use tracing::debug;

use crate::error::{NcmError, Result};

/// NCM file magic: "CTENFDAM"
pub(crate) const NCM_MAGIC: [u8; 8] = *b"CTENFDAM";

/// Raw sections of an NCM container, still encrypted.
///
/// Layout: magic(8) | reserved(2) | key len(4) + key | meta len(4) + meta |
/// crc(4) | reserved(4) | cover len(4) + cover | audio until EOF.
/// All lengths are little-endian u32.
#[derive(Debug)]
pub(crate) struct Container {
    pub key_blob: Vec<u8>,
    pub metadata_blob: Vec<u8>,
    pub cover_image: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Container {
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut magic = Vec::with_capacity(NCM_MAGIC.len());
        r.by_ref().take(NCM_MAGIC.len() as u64).read_to_end(&mut magic)?;
        if magic != NCM_MAGIC {
            return Err(NcmError::InvalidFormat("bad magic".into()));
        }

        read_bytes(r, 2, "header gap")?;
        let key_blob = read_section(r, "key blob")?;
        let metadata_blob = read_section(r, "metadata")?;
        // CRC and a reserved word, neither is checked.
        read_bytes(r, 4, "crc")?;
        read_bytes(r, 4, "reserved")?;
        let cover_image = read_section(r, "cover image")?;

        let mut payload = Vec::new();
        r.read_to_end(&mut payload)?;

        debug!(
            key_blob = key_blob.len(),
            metadata = metadata_blob.len(),
            cover = cover_image.len(),
            payload = payload.len(),
            "read container sections"
        );

        Ok(Self {
            key_blob,
            metadata_blob,
            cover_image,
            payload,
        })
    }
}

/// Read a u32-LE length followed by that many bytes.
fn read_section<R: Read>(r: &mut R, section: &'static str) -> Result<Vec<u8>> {
    let len = read_u32_le(r, section)?;
    read_bytes(r, u64::from(len), section)
}

fn read_u32_le<R: Read>(r: &mut R, section: &'static str) -> Result<u32> {
    let buf = read_bytes(r, 4, section)?;
    Ok(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Read exactly `len` bytes. Only allocates for bytes actually present, so a
/// bogus length cannot force a huge allocation.
fn read_bytes<R: Read>(r: &mut R, len: u64, section: &'static str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.by_ref().take(len).read_to_end(&mut buf)?;
    let actual = buf.len() as u64;
    if actual < len {
        return Err(NcmError::Truncated {
            section,
            expected: len,
            actual,
        });
    }
    Ok(buf)
}
