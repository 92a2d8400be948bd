//! Multi-recipient envelope around an object's content key
//!
//! The content key is wrapped with RSA (PKCS#1 v1.5) once per recipient.
//! Recipients are identified by key name and by a short fingerprint of
//! their public key. Adding or removing a recipient only rewrites the
//! envelope; the object content is never re-encrypted.

use crate::cipher::{Iv, BLOCK_SIZE};
use crate::keys::{pubkey_hash, validate_key_name, ContentKey};
use crate::provider::KeyProvider;
use crate::{CryptoError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Maximum number of recipients per object
pub const MAX_KEYS: usize = 4;

/// Metadata key holding the comma-joined recipient key names
pub const META_KEY_NAME: &str = "key-name";
/// Metadata key holding the comma-joined wrapped content keys
pub const META_SYMMETRIC_KEY: &str = "symmetric-key";
/// Metadata key holding the comma-joined recipient fingerprints
pub const META_PUBKEY_HASH: &str = "pubkey-hash";
/// Metadata key holding the base64 IV seed
pub const META_IV_SEED: &str = "iv-seed";

const LIST_SEPARATOR: &str = ",";

/// The content key wrapped for one recipient
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WrappedKey {
    /// Logical name of the recipient key-pair
    pub key_name: String,
    /// Fingerprint of the recipient public key
    pub pubkey_hash: String,
    /// Base64 RSA-wrapped content key
    pub wrapped: String,
}

/// Encryption envelope stored in an object's metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    entries: Vec<WrappedKey>,
    iv_seed: Iv,
}

/// Wrap `content_key` for every recipient, keyed by recipient fingerprint
pub fn wrap_for_recipients(
    content_key: &ContentKey,
    recipients: &[&RsaPublicKey],
) -> Result<BTreeMap<String, String>> {
    recipients
        .iter()
        .map(|key| Ok((pubkey_hash(key)?, wrap_key(content_key, key)?)))
        .collect()
}

fn wrap_key(content_key: &ContentKey, key: &RsaPublicKey) -> Result<String> {
    let wrapped = key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, content_key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(STANDARD.encode(wrapped))
}

fn unwrap_key(wrapped: &str, key: &RsaPrivateKey) -> Result<ContentKey> {
    let bytes = STANDARD.decode(wrapped)?;
    let raw = zeroize::Zeroizing::new(
        key.decrypt(Pkcs1v15Encrypt, &bytes)
            .map_err(|e| CryptoError::Decryption(e.to_string()))?,
    );
    ContentKey::from_bytes(&raw)
}

impl Envelope {
    /// Wrap a fresh content key for 1 to `MAX_KEYS` named recipients
    pub fn seal(
        content_key: &ContentKey,
        recipients: &[(&str, &RsaPublicKey)],
        iv_seed: Iv,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(CryptoError::InvalidKey("at least one recipient is required".to_string()));
        }
        if recipients.len() > MAX_KEYS {
            return Err(CryptoError::MaxKeysExceeded(MAX_KEYS));
        }

        let mut envelope = Self {
            entries: Vec::with_capacity(recipients.len()),
            iv_seed,
        };
        for (name, key) in recipients {
            validate_key_name(name)?;
            let hash = pubkey_hash(key)?;
            if envelope.position(name).is_some() || envelope.has_hash(&hash) {
                return Err(CryptoError::AlreadyEncryptedKey(name.to_string()));
            }
            envelope.entries.push(WrappedKey {
                key_name: name.to_string(),
                pubkey_hash: hash,
                wrapped: wrap_key(content_key, key)?,
            });
        }
        Ok(envelope)
    }

    /// The wrapped entries, in recipient order
    pub fn entries(&self) -> &[WrappedKey] {
        &self.entries
    }

    /// The IV seed of the content stream
    pub fn iv_seed(&self) -> &Iv {
        &self.iv_seed
    }

    /// Names of the recipient key-pairs
    pub fn key_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key_name.as_str())
    }

    /// Whether `name` is one of the recipients
    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.key_name == name)
    }

    fn has_hash(&self, hash: &str) -> bool {
        self.entries.iter().any(|e| e.pubkey_hash == hash)
    }

    /// Recover the content key with any recipient's locally available private key
    pub fn unwrap(&self, provider: &dyn KeyProvider) -> Result<ContentKey> {
        let mut unauthorized = None;

        for entry in &self.entries {
            let Some(private) = provider.private_key(&entry.key_name)? else {
                continue;
            };
            if pubkey_hash(&RsaPublicKey::from(&private))? != entry.pubkey_hash {
                debug!(key = %entry.key_name, "local private key does not match recipient hash");
                unauthorized.get_or_insert_with(|| entry.key_name.clone());
                continue;
            }
            debug!(key = %entry.key_name, "unwrapping content key");
            return unwrap_key(&entry.wrapped, &private);
        }

        if let Some(name) = unauthorized {
            return Err(CryptoError::KeyNotAuthorized(name));
        }
        match self.entries.as_slice() {
            [only] => Err(CryptoError::PrivateKeyUnavailable(only.key_name.clone())),
            _ => Err(CryptoError::NoEligiblePrivateKey),
        }
    }

    /// Add `name` as a recipient. The content key is recovered with any
    /// available private key and wrapped with the new public key.
    pub fn add_recipient(&mut self, provider: &dyn KeyProvider, name: &str) -> Result<()> {
        validate_key_name(name)?;
        if self.contains_key(name) {
            return Err(CryptoError::AlreadyEncryptedKey(name.to_string()));
        }
        if self.entries.len() >= MAX_KEYS {
            return Err(CryptoError::MaxKeysExceeded(MAX_KEYS));
        }

        let content_key = self.unwrap(provider)?;
        let public = provider
            .public_key(name)?
            .ok_or_else(|| CryptoError::MissingKey(name.to_string()))?;
        let hash = pubkey_hash(&public)?;
        if self.has_hash(&hash) {
            return Err(CryptoError::AlreadyEncryptedKey(name.to_string()));
        }

        self.entries.push(WrappedKey {
            key_name: name.to_string(),
            pubkey_hash: hash,
            wrapped: wrap_key(&content_key, &public)?,
        });
        Ok(())
    }

    /// Drop the recipient `name`
    pub fn remove_recipient(&mut self, name: &str) -> Result<()> {
        if self.entries.len() <= 1 {
            return Err(CryptoError::LastKey);
        }
        let index = self
            .position(name)
            .ok_or_else(|| CryptoError::KeyNotFound(name.to_string()))?;
        self.entries.remove(index);
        Ok(())
    }

    /// Write the envelope into object user metadata, replacing any previous envelope
    pub fn write_metadata(&self, metadata: &mut HashMap<String, String>) {
        metadata.insert(META_KEY_NAME.to_string(), self.join(|e| e.key_name.as_str()));
        metadata.insert(META_SYMMETRIC_KEY.to_string(), self.join(|e| e.wrapped.as_str()));
        metadata.insert(META_PUBKEY_HASH.to_string(), self.join(|e| e.pubkey_hash.as_str()));
        metadata.insert(META_IV_SEED.to_string(), STANDARD.encode(self.iv_seed));
    }

    fn join<'a>(&'a self, field: impl Fn(&'a WrappedKey) -> &'a str) -> String {
        self.entries
            .iter()
            .map(field)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR)
    }

    /// Read an envelope from object user metadata.
    ///
    /// Returns `Ok(None)` when the object carries no envelope at all.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Result<Option<Self>> {
        let names = metadata.get(META_KEY_NAME);
        let wrapped = metadata.get(META_SYMMETRIC_KEY);
        let hashes = metadata.get(META_PUBKEY_HASH);

        let (names, wrapped, hashes) = match (names, wrapped, hashes) {
            (None, None, None) => return Ok(None),
            (Some(n), Some(w), Some(h)) => (n, w, h),
            _ => {
                return Err(CryptoError::MalformedEnvelope(
                    "incomplete recipient metadata".to_string(),
                ))
            }
        };

        let names: Vec<&str> = names.split(LIST_SEPARATOR).collect();
        let wrapped: Vec<&str> = wrapped.split(LIST_SEPARATOR).collect();
        let hashes: Vec<&str> = hashes.split(LIST_SEPARATOR).collect();
        if names.len() != wrapped.len() || names.len() != hashes.len() {
            return Err(CryptoError::MalformedEnvelope(format!(
                "recipient lists differ in length ({}, {}, {})",
                names.len(),
                wrapped.len(),
                hashes.len()
            )));
        }
        if names.iter().any(|n| n.is_empty()) || names.len() > MAX_KEYS {
            return Err(CryptoError::MalformedEnvelope(format!(
                "invalid recipient list '{}'",
                names.join(",")
            )));
        }

        let seed = metadata
            .get(META_IV_SEED)
            .ok_or_else(|| CryptoError::MalformedEnvelope("missing IV seed".to_string()))?;
        let seed = STANDARD.decode(seed)?;
        let iv_seed: Iv = seed.as_slice().try_into().map_err(|_| {
            CryptoError::MalformedEnvelope(format!(
                "IV seed must be {} bytes, got {}",
                BLOCK_SIZE,
                seed.len()
            ))
        })?;

        let entries = names
            .into_iter()
            .zip(wrapped)
            .zip(hashes)
            .map(|((name, wrapped), hash)| WrappedKey {
                key_name: name.to_string(),
                pubkey_hash: hash.to_string(),
                wrapped: wrapped.to_string(),
            })
            .collect();
        Ok(Some(Self { entries, iv_seed }))
    }

    /// Remove all envelope keys from object user metadata
    pub fn clear_metadata(metadata: &mut HashMap<String, String>) {
        for key in [META_KEY_NAME, META_SYMMETRIC_KEY, META_PUBKEY_HASH, META_IV_SEED] {
            metadata.remove(key);
        }
    }
}
