//! Symmetric encryption and signed-token helpers.
//!
//! `Encryptor` derives a fixed key from a passphrase with SHA-256 and runs
//! XTEA in CBC mode with PKCS#7 padding. Output is base64(iv || ciphertext),
//! so each call produces a different string for the same plaintext.
//!
//! Tokens are `base64(JSON payload) . encrypted unix timestamp`; checking a
//! token decrypts the signature half and rejects anything expired or
//! malformed.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

const BLOCK_SIZE: usize = 8;
const XTEA_ROUNDS: u32 = 32;
const XTEA_DELTA: u32 = 0x9E37_79B9;

/// Stateless cipher handle. Cheap to clone; the key is derived once.
#[derive(Debug, Clone)]
pub struct Encryptor {
    key: [u32; 4],
}

impl Encryptor {
    /// Derive the cipher key from a passphrase. The first 16 bytes of the
    /// SHA-256 digest become four big-endian words.
    pub fn new(passkey: &str) -> Self {
        let digest = Sha256::digest(passkey.as_bytes());
        let mut key = [0u32; 4];
        for (i, word) in key.iter_mut().enumerate() {
            let offset = i * 4;
            *word = u32::from_be_bytes([
                digest[offset],
                digest[offset + 1],
                digest[offset + 2],
                digest[offset + 3],
            ]);
        }
        Self { key }
    }

    /// Encrypt a plaintext string. Returns base64(iv || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut data = plaintext.as_bytes().to_vec();
        let pad = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
        data.extend(std::iter::repeat(pad as u8).take(pad));

        let mut out = Vec::with_capacity(BLOCK_SIZE + data.len());
        out.extend_from_slice(&iv);

        let mut prev = iv;
        for chunk in data.chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            for (b, (c, p)) in block.iter_mut().zip(chunk.iter().zip(prev.iter())) {
                *b = c ^ p;
            }
            let encrypted = self.encipher_block(&block);
            out.extend_from_slice(&encrypted);
            prev = encrypted;
        }

        BASE64.encode(out)
    }

    /// Decrypt a value produced by `encrypt`.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let raw = BASE64.decode(ciphertext)?;
        if raw.len() < BLOCK_SIZE * 2 || raw.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::InvalidCiphertext);
        }

        let mut prev: [u8; BLOCK_SIZE] = raw[..BLOCK_SIZE].try_into().unwrap();
        let mut data = Vec::with_capacity(raw.len() - BLOCK_SIZE);

        for chunk in raw[BLOCK_SIZE..].chunks(BLOCK_SIZE) {
            let block: [u8; BLOCK_SIZE] = chunk.try_into().unwrap();
            let decrypted = self.decipher_block(&block);
            for (d, p) in decrypted.iter().zip(prev.iter()) {
                data.push(d ^ p);
            }
            prev = block;
        }

        let pad = *data.last().ok_or(CryptoError::InvalidPadding)? as usize;
        if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
            return Err(CryptoError::InvalidPadding);
        }
        if data[data.len() - pad..].iter().any(|&b| b as usize != pad) {
            return Err(CryptoError::InvalidPadding);
        }
        data.truncate(data.len() - pad);

        String::from_utf8(data).map_err(|_| CryptoError::InvalidUtf8)
    }

    fn encipher_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut v0 = u32::from_be_bytes(block[..4].try_into().unwrap());
        let mut v1 = u32::from_be_bytes(block[4..].try_into().unwrap());
        let mut sum = 0u32;
        for _ in 0..XTEA_ROUNDS {
            v0 = v0.wrapping_add(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
            sum = sum.wrapping_add(XTEA_DELTA);
            v1 = v1.wrapping_add(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
        }
        let mut out = [0u8; BLOCK_SIZE];
        out[..4].copy_from_slice(&v0.to_be_bytes());
        out[4..].copy_from_slice(&v1.to_be_bytes());
        out
    }

    fn decipher_block(&self, block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
        let mut v0 = u32::from_be_bytes(block[..4].try_into().unwrap());
        let mut v1 = u32::from_be_bytes(block[4..].try_into().unwrap());
        let mut sum = XTEA_DELTA.wrapping_mul(XTEA_ROUNDS);
        for _ in 0..XTEA_ROUNDS {
            v1 = v1.wrapping_sub(
                (((v0 << 4) ^ (v0 >> 5)).wrapping_add(v0))
                    ^ sum.wrapping_add(self.key[((sum >> 11) & 3) as usize]),
            );
            sum = sum.wrapping_sub(XTEA_DELTA);
            v0 = v0.wrapping_sub(
                (((v1 << 4) ^ (v1 >> 5)).wrapping_add(v1))
                    ^ sum.wrapping_add(self.key[(sum & 3) as usize]),
            );
        }
        let mut out = [0u8; BLOCK_SIZE];
        out[..4].copy_from_slice(&v0.to_be_bytes());
        out[4..].copy_from_slice(&v1.to_be_bytes());
        out
    }
}

/// Build a token: base64 of the JSON payload, a dot, then the encrypted
/// issue timestamp.
pub fn create_token(payload: &Value, enc: &Encryptor) -> String {
    let body = BASE64.encode(payload.to_string());
    let signature = enc.encrypt(&Utc::now().timestamp().to_string());
    format!("{body}.{signature}")
}

/// Verify a token and return its payload. Rejects tokens whose signature
/// does not decrypt, whose payload is not valid JSON, or whose issue time is
/// older than `max_age_hours`.
pub fn check_token(
    token: &str,
    enc: &Encryptor,
    max_age_hours: i64,
) -> Result<Value, CryptoError> {
    let (body, signature) = token.split_once('.').ok_or(CryptoError::MalformedToken)?;

    let payload_bytes = BASE64
        .decode(body)
        .map_err(|_| CryptoError::MalformedToken)?;
    let payload: Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| CryptoError::MalformedToken)?;

    let issued: i64 = enc
        .decrypt(signature)
        .map_err(|_| CryptoError::MalformedToken)?
        .parse()
        .map_err(|_| CryptoError::MalformedToken)?;

    let age = Utc::now().timestamp() - issued;
    if age >= max_age_hours * 3600 {
        return Err(CryptoError::TokenExpired);
    }

    Ok(payload)
}
