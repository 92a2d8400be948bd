//! # cloudstore
//!
//! Client-side transfers for S3/GCS-style object stores: chunked multipart
//! upload and download, multi-recipient envelope encryption, and recursive
//! copy, rename and delete with retries.
//!
//! This crate re-exports the workspace crates:
//! - [`crypto`]: key providers, RSA key pairs, the part cipher and envelopes
//! - [`store`]: the `ObjectStore` trait with in-memory and HTTP stores
//! - [`core`]: the transfer engine and its client facade

pub use cloudstore_core as core;
pub use cloudstore_crypto as crypto;
pub use cloudstore_store as store;

pub use cloudstore_core::{
    CloudStoreClient, CopyOptions, DeleteOptions, DownloadOptions, EncryptionKeyOptions,
    EngineConfig, Error, OperationHandle, PendingUploadsOptions, RenameOptions, Result,
    UploadOptions,
};
pub use cloudstore_store::{MemoryObjectStore, ObjectStore, PendingUpload, StoreObject, StoreUri};
