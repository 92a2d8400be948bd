//! # cloudstore-crypto
//!
//! Client-side envelope encryption for objects kept in an object store.
//!
//! ## Features
//!
//! - **Envelope encryption**: a random AES-256 content key per object, wrapped
//!   with RSA for up to four named recipients
//! - **Part-wise encryption**: one AES-256-CBC stream cut on block boundaries so
//!   multipart transfers can move parts in parallel
//! - **Key providers**: named key-pairs resolved from `.pem` files in key directories
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudstore_crypto::{ChainedCipher, ContentKey, Envelope, KeyPair, generate_iv};
//!
//! let pair = KeyPair::generate(2048)?;
//! let content_key = ContentKey::generate();
//! let seed = generate_iv();
//! let envelope = Envelope::seal(&content_key, &[("backup", pair.public_key())], seed)?;
//!
//! let cipher = ChainedCipher::new(content_key);
//! let ciphertext = cipher.encrypt_part(envelope.iv_seed(), b"hello", true)?;
//! ```

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod provider;

pub use cipher::{ciphertext_len, generate_iv, ChainedCipher, Iv, BLOCK_SIZE};
pub use envelope::{wrap_for_recipients, Envelope, WrappedKey, MAX_KEYS};
pub use error::{CryptoError, Result};
pub use keys::{pubkey_hash, ContentKey, KeyPair, DEFAULT_RSA_BITS};
pub use provider::{DirectoryKeyProvider, InMemoryKeyProvider, KeyProvider};

// Key types appear in the public API
pub use rsa::{RsaPrivateKey, RsaPublicKey};
