//! # cloudstore-store
//!
//! Object store adapters used by the cloudstore transfer engine.
//!
//! This crate provides:
//! - **ObjectStore trait**: the put / ranged get / list / delete / copy and
//!   multipart primitives the engine is built on, plus listing and aborting
//!   of pending multipart uploads
//! - **MemoryObjectStore**: an in-process store for tests and local tooling
//! - **HttpObjectStore**: an S3-compatible REST store over reqwest
//! - **StoreUri**: `s3://bucket/key` and `gs://bucket/key` addressing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Transfer Engine (core)         │
//! ├─────────────────────────────────────────┤
//! │            ObjectStore Trait            │
//! ├────────────────────┬────────────────────┤
//! │  HttpObjectStore   │ MemoryObjectStore  │
//! ├────────────────────┴────────────────────┤
//! │        S3 / GCS (XML API)               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cloudstore_store::{MemoryObjectStore, ObjectMetadata, ObjectStore};
//!
//! let store = MemoryObjectStore::new();
//! store.create_bucket("photos");
//! store.put_object("photos", "a.jpg", data, &ObjectMetadata::new()).await?;
//! let head = store.get_range("photos", "a.jpg", 0..16).await?;
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod memory;
pub mod types;
pub mod uri;

pub use config::HttpStoreConfig;
pub use error::{Result, StoreError};
pub use http::HttpObjectStore;
pub use memory::{FailureKind, MemoryObjectStore, StoreOp};
pub use types::{CompletedPart, ObjectMetadata, PendingUpload, StoreObject, DEFAULT_MIN_PART_SIZE};
pub use uri::{Scheme, StoreUri};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::ops::Range;

/// Trait for object store backends
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check if a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Read an object's size, ETag and user metadata
    async fn head_object(&self, bucket: &str, key: &str) -> Result<StoreObject>;

    /// Write a whole object in one request
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<StoreObject>;

    /// Read a byte range of an object. The end is clamped to the object size.
    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes>;

    /// List objects whose key starts with `prefix`. Non-recursive listings
    /// stop at the next `/` after the prefix.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<StoreObject>>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    /// Server-side copy. `metadata` replaces the user metadata when given,
    /// otherwise the source metadata is kept.
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<StoreObject>;

    /// Start a multipart upload and return its upload id
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String>;

    /// Upload one part of a multipart upload
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart>;

    /// Commit a multipart upload from its acknowledged parts
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreObject>;

    /// Discard a multipart upload and its parts
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()>;

    /// Multipart uploads still open under `prefix`, ordered by key
    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>>;

    /// Abort every open upload under `prefix` initiated before `older_than`,
    /// returning the uploads aborted
    async fn abort_pending_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PendingUpload>> {
        let mut aborted = Vec::new();
        for upload in self.list_pending_uploads(bucket, prefix).await? {
            if upload.initiated < older_than {
                self.abort_multipart(&upload.bucket, &upload.key, &upload.upload_id)
                    .await?;
                aborted.push(upload);
            }
        }
        Ok(aborted)
    }

    /// Check if an object exists. A missing bucket is still an error.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.head_object(bucket, key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NoSuchKey { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Smallest part size accepted for all but the last part
    fn min_part_size(&self) -> u64 {
        DEFAULT_MIN_PART_SIZE
    }

    /// Whether this store supports multipart uploads
    fn supports_multipart(&self) -> bool {
        true
    }
}
