//! Error types for the cloudstore-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic and key-management operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid ciphertext format
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Invalid chunk size for block-chained encryption
    #[error("invalid chunk size {0}: must be a positive multiple of the cipher block size")]
    InvalidChunkSize(u64),

    /// Object metadata carries no envelope
    #[error("Object doesn't seem to be encrypted")]
    NotEncrypted,

    /// Envelope metadata is present but inconsistent
    #[error("malformed encryption metadata: {0}")]
    MalformedEnvelope(String),

    /// Recipient is already part of the envelope
    #[error("Key '{0}' already exists for this object")]
    AlreadyEncryptedKey(String),

    /// Envelope is full
    #[error("No more than {0} keys are allowed")]
    MaxKeysExceeded(usize),

    /// Public half of a named key-pair cannot be located
    #[error("Missing encryption key '{0}'")]
    MissingKey(String),

    /// Named key is not one of the envelope's recipients
    #[error("Key '{0}' is not one of the object's encryption keys")]
    KeyNotFound(String),

    /// Removing the only remaining recipient
    #[error("Cannot remove the last remaining key")]
    LastKey,

    /// None of the envelope's recipients has a local private key
    #[error("No eligible private key found")]
    NoEligiblePrivateKey,

    /// Single-recipient envelope whose private key is missing locally
    #[error("private key '{0}' is not available to decrypt")]
    PrivateKeyUnavailable(String),

    /// A private key exists under the recipient's name but its hash does not match
    #[error("private key '{0}' exists locally but is not authorized for this object")]
    KeyNotAuthorized(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl CryptoError {
    /// Whether this error describes a key-management or envelope violation
    /// (as opposed to a failure of the primitives themselves)
    pub fn is_key_management(&self) -> bool {
        matches!(
            self,
            Self::NotEncrypted
                | Self::AlreadyEncryptedKey(_)
                | Self::MaxKeysExceeded(_)
                | Self::MissingKey(_)
                | Self::KeyNotFound(_)
                | Self::LastKey
                | Self::NoEligiblePrivateKey
                | Self::PrivateKeyUnavailable(_)
                | Self::KeyNotAuthorized(_)
        )
    }
}
