use aes::Aes128;
use ecb::cipher::{BlockDecryptMut, KeyInit, block_padding::NoPadding};
use rayon::prelude::*;
use thiserror::Error;

use crate::error::{NcmError, Result};

type Aes128EcbDec = ecb::Decryptor<Aes128>;

const BLOCK_SIZE: usize = 16;

/// Payloads at least this large are transformed chunk-parallel.
const PARALLEL_THRESHOLD: usize = 1 << 20;
/// Must stay a multiple of 256 so every chunk starts at keystream phase 0.
const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
#[error("ciphertext length {0} is not a non-zero multiple of 16")]
pub struct BlockLengthError(pub usize);

/// AES-128-ECB decrypt. A valid PKCS#7 tail is stripped, anything else is kept as-is.
pub fn aes128_ecb_decrypt(
    key: &[u8; 16],
    data: &[u8],
) -> std::result::Result<Vec<u8>, BlockLengthError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(BlockLengthError(data.len()));
    }
    let mut buf = data.to_vec();
    Aes128EcbDec::new(key.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| BlockLengthError(data.len()))?;
    let plain_len = buf.len() - pkcs7_padding_len(&buf);
    buf.truncate(plain_len);
    Ok(buf)
}

fn pkcs7_padding_len(buf: &[u8]) -> usize {
    let Some(&last) = buf.last() else {
        return 0;
    };
    let pad = usize::from(last);
    if pad == 0 || pad > BLOCK_SIZE || pad > buf.len() {
        return 0;
    }
    if buf[buf.len() - pad..].iter().all(|&b| b == last) {
        pad
    } else {
        0
    }
}

/// Keystream derived from a file's audio key.
///
/// The permutation comes from the RC4 key schedule. Unlike RC4 proper it is
/// never touched again after scheduling, so the keystream repeats every 256
/// bytes and is precomputed once.
#[derive(Clone)]
pub struct KeyBox {
    keystream: [u8; 256],
}

impl KeyBox {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.is_empty() {
            return Err(NcmError::Crypto("audio key is empty".into()));
        }
        let table = rc4_ksa(key);
        let mut keystream = [0u8; 256];
        for (offset, k) in keystream.iter_mut().enumerate() {
            *k = rc4_stream_byte(&table, offset);
        }
        Ok(Self { keystream })
    }

    #[inline]
    pub fn stream_byte(&self, offset: usize) -> u8 {
        self.keystream[offset & 0xff]
    }

    /// XOR `data` with the keystream, treating `data[0]` as payload offset 0.
    /// Applying it twice restores the input.
    pub fn apply(&self, data: &mut [u8]) {
        if data.len() < PARALLEL_THRESHOLD {
            self.apply_at(data, 0);
            return;
        }
        data.par_chunks_mut(CHUNK_SIZE)
            .enumerate()
            .for_each(|(n, chunk)| self.apply_at(chunk, n * CHUNK_SIZE));
    }

    fn apply_at(&self, data: &mut [u8], offset: usize) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.stream_byte(offset + i);
        }
    }
}

/// Standard RC4 Key Scheduling Algorithm. Returns the permuted S-box.
#[allow(clippy::cast_possible_truncation)]
fn rc4_ksa(key: &[u8]) -> [u8; 256] {
    let mut sbox = [0u8; 256];
    for (i, slot) in sbox.iter_mut().enumerate() {
        *slot = i as u8;
    }

    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(sbox[i]).wrapping_add(key[i % key.len()]);
        sbox.swap(i, usize::from(j));
    }

    sbox
}

/// Modified RC4 stream byte at the given offset. The `sbox` is never mutated.
#[inline]
fn rc4_stream_byte(sbox: &[u8; 256], offset: usize) -> u8 {
    let j = (offset + 1) & 0xff;
    let jv = usize::from(sbox[j]);
    sbox[(jv + usize::from(sbox[(jv + j) & 0xff])) & 0xff]
}
