//! Symmetric ciphers used to wrap key components and cell values.
//!
//! Two AES constructions are provided. [`AesCtr`] is randomized: every call
//! draws a fresh IV, so equal plaintexts produce unequal ciphertexts. It is
//! the default for wrapped key components and values. [`AesEcb`] is
//! deterministic and only appropriate where a caller explicitly wants
//! equal-plaintext-equal-ciphertext behavior. [`NullCipher`] discards its
//! input, for deployments that keep a component entirely out of the store.
//!
//! Key material is zeroized on drop.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptcellError, Result};

/// AES-CTR IV width in bytes, prepended to every ciphertext.
pub const IV_SIZE: usize = 16;

/// An AES key of one of the three standard widths.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum AesKey {
    A128([u8; 16]),
    A192([u8; 24]),
    A256([u8; 32]),
}

impl AesKey {
    /// Accepts exactly 16, 24 or 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes.len() {
            16 => {
                let mut k = [0u8; 16];
                k.copy_from_slice(bytes);
                Ok(AesKey::A128(k))
            }
            24 => {
                let mut k = [0u8; 24];
                k.copy_from_slice(bytes);
                Ok(AesKey::A192(k))
            }
            32 => {
                let mut k = [0u8; 32];
                k.copy_from_slice(bytes);
                Ok(AesKey::A256(k))
            }
            _ => Err(CryptcellError::InvalidKey),
        }
    }
}

impl std::fmt::Debug for AesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self {
            AesKey::A128(_) => 128,
            AesKey::A192(_) => 192,
            AesKey::A256(_) => 256,
        };
        write!(f, "AesKey({} bits)", bits)
    }
}

/// A symmetric cipher over byte strings.
///
/// `decrypt_at` treats everything from `offset` to the end of `data` as the
/// ciphertext, which lets callers decrypt a blob that trails a public
/// prefix without copying it out first.
pub trait Cipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_at(data, 0)
    }

    fn decrypt_at(&self, data: &[u8], offset: usize) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// AES-CTR
// ---------------------------------------------------------------------------

/// Randomized AES-CTR. Output layout is `iv || ciphertext`.
pub struct AesCtr {
    key: AesKey,
    rng: SystemRandom,
}

impl AesCtr {
    pub fn new(key: AesKey) -> Self {
        Self {
            key,
            rng: SystemRandom::new(),
        }
    }
}

fn apply_ctr(key: &AesKey, iv: &[u8; IV_SIZE], buf: &mut [u8]) {
    match key {
        AesKey::A128(k) => {
            ctr::Ctr128BE::<aes::Aes128>::new(k.into(), iv.into()).apply_keystream(buf)
        }
        AesKey::A192(k) => {
            ctr::Ctr128BE::<aes::Aes192>::new(k.into(), iv.into()).apply_keystream(buf)
        }
        AesKey::A256(k) => {
            ctr::Ctr128BE::<aes::Aes256>::new(k.into(), iv.into()).apply_keystream(buf)
        }
    }
}

impl Cipher for AesCtr {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Err(CryptcellError::InsufficientData);
        }
        let mut iv = [0u8; IV_SIZE];
        self.rng
            .fill(&mut iv)
            .map_err(|_| CryptcellError::RandomnessFailure)?;
        let mut out = Vec::with_capacity(IV_SIZE + plaintext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(plaintext);
        apply_ctr(&self.key, &iv, &mut out[IV_SIZE..]);
        Ok(out)
    }

    fn decrypt_at(&self, data: &[u8], offset: usize) -> Result<Vec<u8>> {
        // The framing is iv || ct; ct must be non-empty.
        if data.len() <= offset + IV_SIZE {
            return Err(CryptcellError::InsufficientData);
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&data[offset..offset + IV_SIZE]);
        let mut out = data[offset + IV_SIZE..].to_vec();
        apply_ctr(&self.key, &iv, &mut out);
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// AES-ECB
// ---------------------------------------------------------------------------

/// Deterministic AES-ECB with PKCS#7 padding. Equal plaintexts map to equal
/// ciphertexts, so this leaks equality; use only where that is intended.
pub struct AesEcb {
    key: AesKey,
}

impl AesEcb {
    pub fn new(key: AesKey) -> Self {
        Self { key }
    }
}

impl Cipher for AesEcb {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Err(CryptcellError::InsufficientData);
        }
        let out = match &self.key {
            AesKey::A128(k) => ecb::Encryptor::<aes::Aes128>::new(k.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            AesKey::A192(k) => ecb::Encryptor::<aes::Aes192>::new(k.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
            AesKey::A256(k) => ecb::Encryptor::<aes::Aes256>::new(k.into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        };
        Ok(out)
    }

    fn decrypt_at(&self, data: &[u8], offset: usize) -> Result<Vec<u8>> {
        if data.len() <= offset {
            return Err(CryptcellError::InsufficientData);
        }
        let ct = &data[offset..];
        match &self.key {
            AesKey::A128(k) => ecb::Decryptor::<aes::Aes128>::new(k.into())
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
            AesKey::A192(k) => ecb::Decryptor::<aes::Aes192>::new(k.into())
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
            AesKey::A256(k) => ecb::Decryptor::<aes::Aes256>::new(k.into())
                .decrypt_padded_vec_mut::<Pkcs7>(ct),
        }
        .map_err(|_| CryptcellError::DecryptionFailure)
    }
}

// ---------------------------------------------------------------------------
// Null cipher
// ---------------------------------------------------------------------------

/// Discards plaintext entirely. Encryption yields a single zero byte as a
/// placeholder; decryption is impossible and reports `Unsupported`.
pub struct NullCipher;

impl Cipher for NullCipher {
    fn encrypt(&self, _plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(vec![0])
    }

    fn decrypt_at(&self, _data: &[u8], _offset: usize) -> Result<Vec<u8>> {
        Err(CryptcellError::Unsupported(
            "null cipher discards plaintext and cannot decrypt",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_width_validation() {
        assert!(AesKey::from_bytes(&[0u8; 16]).is_ok());
        assert!(AesKey::from_bytes(&[0u8; 24]).is_ok());
        assert!(AesKey::from_bytes(&[0u8; 32]).is_ok());
        assert!(matches!(
            AesKey::from_bytes(&[0u8; 15]),
            Err(CryptcellError::InvalidKey)
        ));
    }

    #[test]
    fn test_ctr_roundtrip_all_widths() {
        for width in [16usize, 24, 32] {
            let cipher = AesCtr::new(AesKey::from_bytes(&vec![7u8; width]).unwrap());
            let ct = cipher.encrypt(b"attack at dawn").unwrap();
            assert_eq!(ct.len(), IV_SIZE + 14);
            assert_eq!(cipher.decrypt(&ct).unwrap(), b"attack at dawn");
        }
    }

    #[test]
    fn test_ctr_is_randomized() {
        let cipher = AesCtr::new(AesKey::from_bytes(&[1u8; 16]).unwrap());
        let a = cipher.encrypt(b"same plaintext").unwrap();
        let b = cipher.encrypt(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ctr_decrypt_at_offset_skips_prefix() {
        let cipher = AesCtr::new(AesKey::from_bytes(&[2u8; 32]).unwrap());
        let ct = cipher.encrypt(b"payload").unwrap();
        let mut framed = b"public-prefix".to_vec();
        framed.extend_from_slice(&ct);
        assert_eq!(cipher.decrypt_at(&framed, 13).unwrap(), b"payload");
    }

    #[test]
    fn test_ctr_rejects_truncated_input() {
        let cipher = AesCtr::new(AesKey::from_bytes(&[3u8; 16]).unwrap());
        assert!(matches!(
            cipher.decrypt(&[0u8; 10]),
            Err(CryptcellError::InsufficientData)
        ));
        // An IV with no ciphertext after it is also short.
        assert!(matches!(
            cipher.decrypt(&[0u8; IV_SIZE]),
            Err(CryptcellError::InsufficientData)
        ));
        assert!(matches!(
            cipher.decrypt_at(&[0u8; 3 + IV_SIZE], 3),
            Err(CryptcellError::InsufficientData)
        ));
    }

    #[test]
    fn test_encrypt_rejects_empty_input() {
        let ctr = AesCtr::new(AesKey::from_bytes(&[3u8; 16]).unwrap());
        assert!(matches!(
            ctr.encrypt(b""),
            Err(CryptcellError::InsufficientData)
        ));
        let ecb = AesEcb::new(AesKey::from_bytes(&[3u8; 16]).unwrap());
        assert!(matches!(
            ecb.encrypt(b""),
            Err(CryptcellError::InsufficientData)
        ));
    }

    #[test]
    fn test_ecb_is_deterministic_and_roundtrips() {
        let cipher = AesEcb::new(AesKey::from_bytes(&[4u8; 16]).unwrap());
        let a = cipher.encrypt(b"same plaintext").unwrap();
        let b = cipher.encrypt(b"same plaintext").unwrap();
        assert_eq!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), b"same plaintext");
    }

    #[test]
    fn test_ecb_rejects_garbage() {
        let cipher = AesEcb::new(AesKey::from_bytes(&[5u8; 16]).unwrap());
        assert!(cipher.decrypt(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_null_cipher() {
        let cipher = NullCipher;
        assert_eq!(cipher.encrypt(b"anything").unwrap(), vec![0]);
        assert!(matches!(
            cipher.decrypt(&[0]),
            Err(CryptcellError::Unsupported(_))
        ));
    }
}
