//! Builders for synthetic NCM containers used across unit tests.

use std::io::Read;

use aes::Aes128;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ecb::cipher::{
    BlockEncryptMut, KeyInit,
    block_padding::{NoPadding, Pkcs7},
};

use crate::cipher::KeyBox;
use crate::container::NCM_MAGIC;
use crate::key::CORE_KEY;
use crate::metadata::{META_KEY, META_TAG};

type Aes128EcbEnc = ecb::Encryptor<Aes128>;

/// AES-128-ECB encrypt with PKCS#7 padding.
pub fn aes128_ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Vec<u8> {
    // room for one full block of padding
    let mut buf = vec![0u8; (data.len() / 16 + 1) * 16];
    buf[..data.len()].copy_from_slice(data);
    Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .unwrap()
        .to_vec()
}

/// AES-128-ECB encrypt without padding. `data` must be block-aligned.
pub fn aes128_ecb_encrypt_unpadded(key: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let mut buf = data.to_vec();
    Aes128EcbEnc::new(key.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
        .unwrap()
        .to_vec()
}

pub fn key_blob(audio_key: &[u8]) -> Vec<u8> {
    let mut plain = b"neteasecloudmusic".to_vec();
    plain.extend_from_slice(audio_key);
    mask_key_blob(aes128_ecb_encrypt(&CORE_KEY, &plain))
}

/// Key blob whose plaintext carries no PKCS#7 padding.
/// `17 + audio_key.len()` must be a multiple of 16.
pub fn unpadded_key_blob(audio_key: &[u8]) -> Vec<u8> {
    let mut plain = b"neteasecloudmusic".to_vec();
    plain.extend_from_slice(audio_key);
    mask_key_blob(aes128_ecb_encrypt_unpadded(&CORE_KEY, &plain))
}

fn mask_key_blob(encrypted: Vec<u8>) -> Vec<u8> {
    encrypted.into_iter().map(|b| b ^ 0x64).collect()
}

pub fn metadata_blob(json: &str) -> Vec<u8> {
    let mut plain = b"music:".to_vec();
    plain.extend_from_slice(json.as_bytes());
    let encrypted = aes128_ecb_encrypt(&META_KEY, &plain);
    let mut blob = META_TAG.to_vec();
    blob.extend_from_slice(BASE64.encode(encrypted).as_bytes());
    blob
}

pub fn encrypt_payload(audio_key: &[u8], plain: &[u8]) -> Vec<u8> {
    let mut data = plain.to_vec();
    KeyBox::new(audio_key).unwrap().apply(&mut data);
    data
}

#[allow(clippy::cast_possible_truncation)]
pub fn container_bytes(key: &[u8], meta: &[u8], cover: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = NCM_MAGIC.to_vec();
    out.extend_from_slice(&[0x01, 0x70]);
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    out.extend_from_slice(meta);
    out.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(cover.len() as u32).to_le_bytes());
    out.extend_from_slice(cover);
    out.extend_from_slice(payload);
    out
}

/// Reader that records how many bytes were pulled through it.
pub struct CountingReader<R> {
    inner: R,
    read: usize,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, read: 0 }
    }

    pub fn bytes_read(&self) -> usize {
        self.read
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n;
        Ok(n)
    }
}
