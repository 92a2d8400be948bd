//! # cloudstore-core
//!
//! Transfer engine for files and key hierarchies kept in an object store.
//!
//! This crate provides:
//! - **Chunked transfers**: multipart uploads and ranged downloads, with
//!   parts moved concurrently under a bounded worker pool
//! - **Envelope encryption**: objects encrypted for one to four named
//!   recipient keys, and recipients added or removed in place
//! - **Retries**: every store call runs under a retry policy, with a fault
//!   injector for deterministic failure tests
//! - **Recursive operations**: copy, rename and delete over key prefixes
//!   with dry-run and partial-failure reporting
//! - **Pending uploads**: listing and aborting multipart uploads left open
//!   by interrupted transfers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     CloudStoreClient / OperationHandle  │
//! ├─────────────────────────────────────────┤
//! │   copy · rename · delete (recursive)    │
//! ├────────────────────┬────────────────────┤
//! │  upload / download │   key management   │
//! ├────────────────────┴────────────────────┤
//! │     RetryExecutor  +  FaultInjector     │
//! ├─────────────────────────────────────────┤
//! │        ObjectStore (cloudstore-store)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudstore_core::{CloudStoreClient, UploadOptions};
//! use cloudstore_store::{MemoryObjectStore, StoreUri};
//!
//! let client = CloudStoreClient::builder(Arc::new(MemoryObjectStore::new())).build()?;
//! let options = UploadOptions::new("report.pdf", StoreUri::parse("s3://docs/2024/")?)
//!     .with_encryption_key("backup")?;
//! let object = client.upload(options).await?;
//! ```

mod batch;
mod copy;
mod delete;
mod download;
mod encryption;
mod engine;
mod pending;
mod rename;
mod upload;

pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod metadata;
pub mod options;
pub mod plan;
pub mod progress;
pub mod retry;

pub use client::{ClientBuilder, CloudStoreClient};
pub use config::EngineConfig;
pub use error::{BatchFailure, Error, ErrorClass, Result};
pub use handle::OperationHandle;
pub use metadata::{TransferMetadata, FORMAT_VERSION};
pub use options::{
    CopyOptions, DeleteOptions, DownloadOptions, EncryptionKeyOptions, PendingUploadsOptions,
    RenameOptions, UploadOptions,
};
pub use plan::{default_chunk_size, Part, TransferPlan};
pub use progress::{PartProgress, ProgressListener, ProgressTracker};
pub use retry::{
    AbortCounters, AbortScope, FaultInjector, NoFaults, OperationKind, RetriableTask,
    RetryEvent, RetryExecutor, RetryListener, RetryListeners, RetryPolicy,
};
