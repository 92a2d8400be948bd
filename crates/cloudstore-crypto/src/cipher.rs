//! Block-chained AES-256-CBC encryption of object parts
//!
//! An object's plaintext is encrypted as one continuous CBC stream with
//! PKCS#7 padding. Parts are cut on block boundaries so that each one can
//! be encrypted or decrypted on its own once its IV is known: the IV of
//! part 0 is the random seed stored with the object, and the IV of part
//! `i > 0` is the last ciphertext block of part `i - 1`.

use crate::keys::ContentKey;
use crate::{CryptoError, Result};
use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::rngs::OsRng;
use std::io::Read;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Initialization vector for one part
pub type Iv = [u8; BLOCK_SIZE];

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Generate a random IV seed
pub fn generate_iv() -> Iv {
    let mut iv = [0u8; BLOCK_SIZE];
    rand::RngCore::fill_bytes(&mut OsRng, &mut iv);
    iv
}

/// Length of the padded ciphertext for a plaintext of `plain_len` bytes
pub fn ciphertext_len(plain_len: u64) -> u64 {
    (plain_len / BLOCK_SIZE as u64 + 1) * BLOCK_SIZE as u64
}

/// Check that a chunk size can be used as a part boundary
pub fn validate_chunk_size(chunk_size: u64) -> Result<()> {
    if chunk_size == 0 || chunk_size % BLOCK_SIZE as u64 != 0 {
        return Err(CryptoError::InvalidChunkSize(chunk_size));
    }
    Ok(())
}

/// Last ciphertext block of a part, i.e. the IV of the part that follows it
pub fn chained_iv(ciphertext: &[u8]) -> Result<Iv> {
    if ciphertext.len() < BLOCK_SIZE {
        return Err(CryptoError::InvalidCiphertext(format!(
            "need at least one block to chain from, got {} bytes",
            ciphertext.len()
        )));
    }
    let mut iv = [0u8; BLOCK_SIZE];
    iv.copy_from_slice(&ciphertext[ciphertext.len() - BLOCK_SIZE..]);
    Ok(iv)
}

/// Part-wise AES-256-CBC cipher bound to one content key
#[derive(Clone)]
pub struct ChainedCipher {
    key: ContentKey,
}

impl ChainedCipher {
    /// Create a cipher for the given content key
    pub fn new(key: ContentKey) -> Self {
        Self { key }
    }

    /// The content key
    pub fn key(&self) -> &ContentKey {
        &self.key
    }

    /// Encrypt one part. Only the last part is padded; every other part
    /// must be block aligned.
    pub fn encrypt_part(&self, iv: &Iv, plaintext: &[u8], is_last: bool) -> Result<Vec<u8>> {
        let encryptor = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        if is_last {
            return Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext));
        }
        if plaintext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::Encryption(format!(
                "non-final part of {} bytes is not block aligned",
                plaintext.len()
            )));
        }
        Ok(encryptor.encrypt_padded_vec_mut::<NoPadding>(plaintext))
    }

    /// Decrypt one part. The last part carries the PKCS#7 padding.
    pub fn decrypt_part(&self, iv: &Iv, ciphertext: &[u8], is_last: bool) -> Result<Vec<u8>> {
        if ciphertext.len() % BLOCK_SIZE != 0 || (is_last && ciphertext.is_empty()) {
            return Err(CryptoError::InvalidCiphertext(format!(
                "part of {} bytes is not a whole number of blocks",
                ciphertext.len()
            )));
        }

        let decryptor = Aes256CbcDec::new_from_slices(self.key.as_bytes(), iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        let result = if is_last {
            decryptor.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        } else {
            decryptor.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        };
        result.map_err(|_| CryptoError::Decryption("invalid padding".to_string()))
    }

    /// Run the sequential encrypting pass over `reader` and return the IV
    /// of each of the `part_count` parts.
    ///
    /// The ciphertext of the final part is never needed for chaining, so
    /// only the first `part_count - 1` chunks are read.
    pub fn part_ivs<R: Read>(
        &self,
        mut reader: R,
        iv_seed: &Iv,
        chunk_size: u64,
        part_count: usize,
    ) -> Result<Vec<Iv>> {
        validate_chunk_size(chunk_size)?;
        let chunk = usize::try_from(chunk_size)
            .map_err(|_| CryptoError::InvalidChunkSize(chunk_size))?;

        let mut ivs = Vec::with_capacity(part_count);
        let mut iv = *iv_seed;
        let mut buf = vec![0u8; chunk];
        for index in 0..part_count {
            ivs.push(iv);
            if index + 1 == part_count {
                break;
            }
            reader.read_exact(&mut buf)?;
            let ciphertext = self.encrypt_part(&iv, &buf, false)?;
            iv = chained_iv(&ciphertext)?;
        }
        Ok(ivs)
    }
}

impl std::fmt::Debug for ChainedCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> ChainedCipher {
        ChainedCipher::new(ContentKey::generate())
    }

    fn encrypt_whole(cipher: &ChainedCipher, iv: &Iv, data: &[u8]) -> Vec<u8> {
        cipher.encrypt_part(iv, data, true).unwrap()
    }

    #[test]
    fn test_ciphertext_len() {
        assert_eq!(ciphertext_len(0), 16);
        assert_eq!(ciphertext_len(15), 16);
        assert_eq!(ciphertext_len(16), 32);
        assert_eq!(ciphertext_len(100), 112);
    }

    #[test]
    fn test_empty_plaintext_roundtrip() {
        let cipher = cipher();
        let iv = generate_iv();
        let ct = cipher.encrypt_part(&iv, &[], true).unwrap();
        assert_eq!(ct.len(), BLOCK_SIZE);
        assert!(cipher.decrypt_part(&iv, &ct, true).unwrap().is_empty());
    }

    #[test]
    fn test_parts_match_single_stream() {
        let cipher = cipher();
        let seed = generate_iv();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let chunk = 64u64;
        let parts = (data.len() as u64).div_ceil(chunk) as usize;

        let ivs = cipher.part_ivs(&data[..], &seed, chunk, parts).unwrap();
        assert_eq!(ivs.len(), parts);
        assert_eq!(ivs[0], seed);

        let mut stitched = Vec::new();
        for (i, piece) in data.chunks(chunk as usize).enumerate() {
            let last = i + 1 == parts;
            stitched.extend(cipher.encrypt_part(&ivs[i], piece, last).unwrap());
        }
        assert_eq!(stitched, encrypt_whole(&cipher, &seed, &data));
    }

    #[test]
    fn test_decrypt_part_from_preceding_block() {
        let cipher = cipher();
        let seed = generate_iv();
        let data = vec![7u8; 200];
        let ct = encrypt_whole(&cipher, &seed, &data);

        // second half starting at byte 96, IV is the block before it
        let iv = chained_iv(&ct[..96]).unwrap();
        let tail = cipher.decrypt_part(&iv, &ct[96..], true).unwrap();
        assert_eq!(tail, &data[96..]);

        let head = cipher.decrypt_part(&seed, &ct[..96], false).unwrap();
        assert_eq!(head, &data[..96]);
    }

    #[test]
    fn test_unaligned_inner_part_rejected() {
        let cipher = cipher();
        let iv = generate_iv();
        assert!(cipher.encrypt_part(&iv, &[1u8; 10], false).is_err());
        assert!(cipher.decrypt_part(&iv, &[1u8; 10], false).is_err());
        assert!(validate_chunk_size(100).is_err());
        assert!(validate_chunk_size(0).is_err());
        assert!(validate_chunk_size(1024).is_ok());
    }

    #[test]
    fn test_wrong_key_fails_padding() {
        let iv = generate_iv();
        let ct = cipher().encrypt_part(&iv, b"hello world", true).unwrap();
        let result = cipher().decrypt_part(&iv, &ct, true);
        // a random key almost always yields invalid padding
        if let Ok(plain) = result {
            assert_ne!(plain, b"hello world");
        }
    }
}
