//! AES-256-CBC encryption for stored directory passwords.
//!
//! Each password is encrypted separately with a fresh random IV. The stored
//! ciphertext carries an HMAC-SHA256 tag over `iv || aes_output` so that a
//! flipped byte in either field is rejected instead of decrypting to garbage.
//! The encryption key is the SHA-256 digest of the operator passphrase; the
//! MAC key is HMAC-SHA256 over a fixed label, keyed with the encryption key.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// AES block size in bytes (128 bits)
const BLOCK_SIZE: usize = 16;

/// Size of the IV in bytes (one block)
const IV_SIZE: usize = 16;

/// Size of the HMAC-SHA256 tag appended to the ciphertext
const TAG_SIZE: usize = 32;

const MAC_KEY_LABEL: &[u8] = b"credential-broker/password-mac";

/// Decryption failures. Any of these means the stored record is corrupted or
/// has been tampered with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("{0} is not valid base64")]
    Encoding(&'static str),
    #[error("invalid IV size: expected 16 bytes, got {0}")]
    InvalidIv(usize),
    #[error("invalid ciphertext size: {0} bytes")]
    InvalidLength(usize),
    #[error("authentication tag mismatch (wrong key or tampered record)")]
    TagMismatch,
    #[error("inconsistent block padding")]
    Padding,
    #[error("decrypted password is not valid UTF-8")]
    NotUtf8,
    #[error("failed to initialize cipher")]
    Init,
}

/// Ciphertext and IV of one password, both base64-encoded for text columns.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedPassword {
    pub ciphertext: String,
    pub iv: String,
}

impl std::fmt::Debug for SealedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealedPassword([redacted])")
    }
}

/// Process-wide password cipher.
///
/// Built once at startup from the configured passphrase; key material is
/// zeroized when the cipher is dropped.
pub struct Cipher {
    enc_key: Zeroizing<[u8; KEY_SIZE]>,
    mac_key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Cipher {
    /// Derives the 256-bit keys from a passphrase of any length.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CipherError> {
        let mut enc_key = Zeroizing::new([0u8; KEY_SIZE]);
        enc_key.copy_from_slice(&Sha256::digest(passphrase.as_bytes()));
        let mac_key = derive_mac_key(&enc_key)?;

        Ok(Self { enc_key, mac_key })
    }

    /// Encrypts a password with a fresh random IV.
    ///
    /// # Returns
    /// * `Ok(SealedPassword)` - base64 ciphertext (AES output followed by the tag) and base64 IV
    /// * `Err` - If the cipher cannot be initialized
    pub fn encrypt(&self, plaintext: &str) -> Result<SealedPassword, CipherError> {
        // Never reuse an IV
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let msg_len = plaintext.len();
        let pad_len = BLOCK_SIZE - (msg_len % BLOCK_SIZE);
        let mut buf = Zeroizing::new(vec![0u8; msg_len + pad_len]);
        buf[..msg_len].copy_from_slice(plaintext.as_bytes());

        let encryptor = Aes256CbcEnc::new_from_slices(self.enc_key.as_slice(), &iv)
            .map_err(|_| CipherError::Init)?;
        let mut blob = encryptor
            .encrypt_padded_mut::<Pkcs7>(buf.as_mut_slice(), msg_len)
            .map_err(|_| CipherError::Padding)?
            .to_vec();

        let tag = self.tag(&iv, &blob)?.finalize().into_bytes();
        blob.extend_from_slice(&tag);

        Ok(SealedPassword {
            ciphertext: BASE64.encode(&blob),
            iv: BASE64.encode(iv),
        })
    }

    /// Decrypts a password produced by [`Cipher::encrypt`].
    ///
    /// The tag is verified before any decryption happens. Errors never carry
    /// key, ciphertext or plaintext material.
    pub fn decrypt(&self, ciphertext: &str, iv: &str) -> Result<Zeroizing<String>, CipherError> {
        let iv = BASE64
            .decode(iv)
            .map_err(|_| CipherError::Encoding("IV"))?;
        if iv.len() != IV_SIZE {
            return Err(CipherError::InvalidIv(iv.len()));
        }

        let blob = BASE64
            .decode(ciphertext)
            .map_err(|_| CipherError::Encoding("ciphertext"))?;
        if blob.len() < TAG_SIZE + BLOCK_SIZE || (blob.len() - TAG_SIZE) % BLOCK_SIZE != 0 {
            return Err(CipherError::InvalidLength(blob.len()));
        }

        let (body, tag) = blob.split_at(blob.len() - TAG_SIZE);
        self.tag(&iv, body)?
            .verify_slice(tag)
            .map_err(|_| CipherError::TagMismatch)?;

        let mut buf = Zeroizing::new(body.to_vec());
        let decryptor = Aes256CbcDec::new_from_slices(self.enc_key.as_slice(), &iv)
            .map_err(|_| CipherError::Init)?;
        let plaintext = decryptor
            .decrypt_padded_mut::<Pkcs7>(buf.as_mut_slice())
            .map_err(|_| CipherError::Padding)?;

        std::str::from_utf8(plaintext)
            .map(|s| Zeroizing::new(s.to_owned()))
            .map_err(|_| CipherError::NotUtf8)
    }

    fn tag(&self, iv: &[u8], body: &[u8]) -> Result<HmacSha256, CipherError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.mac_key.as_slice())
            .map_err(|_| CipherError::Init)?;
        mac.update(iv);
        mac.update(body);
        Ok(mac)
    }
}

fn derive_mac_key(enc_key: &[u8; KEY_SIZE]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CipherError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(enc_key).map_err(|_| CipherError::Init)?;
    mac.update(MAC_KEY_LABEL);

    let mut mac_key = Zeroizing::new([0u8; KEY_SIZE]);
    mac_key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(mac_key)
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Cipher([redacted])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbc::cipher::block_padding::NoPadding;

    fn test_cipher() -> Cipher {
        Cipher::from_passphrase("unit-test-passphrase").unwrap()
    }

    fn flip_byte(b64: &str, index: usize) -> String {
        let mut bytes = BASE64.decode(b64).unwrap();
        bytes[index] ^= 0x01;
        BASE64.encode(bytes)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();

        for plaintext in [
            "",
            "Secr3t!",
            "exactly-16-bytes",
            "a considerably longer password spanning several AES blocks",
            "pässwörd-ünïcode",
        ] {
            let sealed = cipher.encrypt(plaintext).expect("Encryption failed");
            assert_ne!(sealed.ciphertext, plaintext);

            let decrypted = cipher
                .decrypt(&sealed.ciphertext, &sealed.iv)
                .expect("Decryption failed");
            assert_eq!(decrypted.as_str(), plaintext);
        }
    }

    #[test]
    fn test_ciphertext_sizes() {
        let cipher = test_cipher();

        // Empty and 16-byte plaintexts both gain a full padding block
        let empty = BASE64.decode(cipher.encrypt("").unwrap().ciphertext).unwrap();
        assert_eq!(empty.len(), BLOCK_SIZE + TAG_SIZE);

        let one_block = BASE64
            .decode(cipher.encrypt("exactly-16-bytes").unwrap().ciphertext)
            .unwrap();
        assert_eq!(one_block.len(), 2 * BLOCK_SIZE + TAG_SIZE);

        let iv = BASE64.decode(cipher.encrypt("x").unwrap().iv).unwrap();
        assert_eq!(iv.len(), IV_SIZE);
    }

    #[test]
    fn test_different_ivs() {
        let cipher = test_cipher();

        let first = cipher.encrypt("same-plaintext").unwrap();
        let second = cipher.encrypt("same-plaintext").unwrap();

        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);

        assert_eq!(
            cipher.decrypt(&first.ciphertext, &first.iv).unwrap().as_str(),
            "same-plaintext"
        );
        assert_eq!(
            cipher.decrypt(&second.ciphertext, &second.iv).unwrap().as_str(),
            "same-plaintext"
        );
    }

    #[test]
    fn test_same_passphrase_same_keys() {
        let sealed = Cipher::from_passphrase("shared").unwrap().encrypt("secret").unwrap();
        let decrypted = Cipher::from_passphrase("shared")
            .unwrap()
            .decrypt(&sealed.ciphertext, &sealed.iv)
            .unwrap();
        assert_eq!(decrypted.as_str(), "secret");
    }

    #[test]
    fn test_mac_key_is_hmac_of_label() {
        let cipher = test_cipher();

        let enc_key = Sha256::digest(b"unit-test-passphrase");
        assert_eq!(cipher.enc_key.as_slice(), enc_key.as_slice());

        let mut mac = <HmacSha256 as Mac>::new_from_slice(&enc_key).unwrap();
        mac.update(b"credential-broker/password-mac");
        assert_eq!(cipher.mac_key.as_slice(), mac.finalize().into_bytes().as_slice());

        // Distinct from a plain digest of label and key
        let mut plain = Sha256::new();
        plain.update(MAC_KEY_LABEL);
        plain.update(enc_key);
        assert_ne!(cipher.mac_key.as_slice(), plain.finalize().as_slice());
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = Cipher::from_passphrase("key-one").unwrap().encrypt("secret").unwrap();
        let result = Cipher::from_passphrase("key-two")
            .unwrap()
            .decrypt(&sealed.ciphertext, &sealed.iv);
        assert_eq!(result.unwrap_err(), CipherError::TagMismatch);
    }

    #[test]
    fn test_every_flipped_ciphertext_byte_detected() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("a password longer than one block").unwrap();
        let len = BASE64.decode(&sealed.ciphertext).unwrap().len();

        for index in 0..len {
            let tampered = flip_byte(&sealed.ciphertext, index);
            let result = cipher.decrypt(&tampered, &sealed.iv);
            assert_eq!(result.unwrap_err(), CipherError::TagMismatch, "byte {}", index);
        }
    }

    #[test]
    fn test_every_flipped_iv_byte_detected() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("Secr3t!").unwrap();

        for index in 0..IV_SIZE {
            let tampered = flip_byte(&sealed.iv, index);
            let result = cipher.decrypt(&sealed.ciphertext, &tampered);
            assert_eq!(result.unwrap_err(), CipherError::TagMismatch, "byte {}", index);
        }
    }

    #[test]
    fn test_malformed_iv() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("secret").unwrap();

        let result = cipher.decrypt(&sealed.ciphertext, "not-valid-base64!@#$");
        assert_eq!(result.unwrap_err(), CipherError::Encoding("IV"));

        let short_iv = BASE64.encode([0u8; 8]);
        let result = cipher.decrypt(&sealed.ciphertext, &short_iv);
        assert_eq!(result.unwrap_err(), CipherError::InvalidIv(8));
    }

    #[test]
    fn test_ciphertext_not_block_aligned() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("secret").unwrap();

        let mut bytes = BASE64.decode(&sealed.ciphertext).unwrap();
        bytes.push(0);
        let result = cipher.decrypt(&BASE64.encode(&bytes), &sealed.iv);
        assert_eq!(result.unwrap_err(), CipherError::InvalidLength(bytes.len()));

        let result = cipher.decrypt(&BASE64.encode([0u8; 8]), &sealed.iv);
        assert_eq!(result.unwrap_err(), CipherError::InvalidLength(8));
    }

    #[test]
    fn test_inconsistent_padding_rejected() {
        let cipher = test_cipher();
        let iv = [7u8; IV_SIZE];

        // Last byte claims 0x20 bytes of padding inside a 16-byte block
        let mut block = [b'a'; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 0x20;
        let encryptor = Aes256CbcEnc::new_from_slices(cipher.enc_key.as_slice(), &iv).unwrap();
        let mut body = encryptor
            .encrypt_padded_mut::<NoPadding>(&mut block, BLOCK_SIZE)
            .unwrap()
            .to_vec();
        let tag = cipher.tag(&iv, &body).unwrap().finalize().into_bytes();
        body.extend_from_slice(&tag);

        let result = cipher.decrypt(&BASE64.encode(&body), &BASE64.encode(iv));
        assert_eq!(result.unwrap_err(), CipherError::Padding);
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let cipher = test_cipher();
        assert_eq!(format!("{:?}", cipher), "Cipher([redacted])");

        let sealed = cipher.encrypt("secret").unwrap();
        assert!(!format!("{:?}", sealed).contains(&sealed.ciphertext));
    }
}
