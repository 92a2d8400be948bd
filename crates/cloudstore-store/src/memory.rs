//! In-memory object store for testing and local tooling

use crate::{
    CompletedPart, ObjectMetadata, ObjectStore, PendingUpload, Result, StoreError, StoreObject,
    DEFAULT_MIN_PART_SIZE,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Store primitives, used to target injected failures and count calls
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Head,
    Put,
    GetRange,
    List,
    Delete,
    Copy,
    InitiateMultipart,
    UploadPart,
    CompleteMultipart,
    AbortMultipart,
    ListUploads,
}

/// Kind of error produced by an injected failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// `StoreError::Unavailable`, retryable
    Transient,
    /// `StoreError::AccessDenied`, not retryable
    Fatal,
}

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
    canned_acl: Option<String>,
    user_metadata: HashMap<String, String>,
}

impl StoredObject {
    fn new(data: Bytes, etag: String, metadata: &ObjectMetadata) -> Self {
        Self {
            data,
            etag,
            last_modified: Utc::now(),
            content_type: metadata.content_type.clone(),
            canned_acl: metadata.canned_acl.clone(),
            user_metadata: metadata.user_metadata.clone(),
        }
    }

    fn snapshot(&self, bucket: &str, key: &str) -> StoreObject {
        StoreObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: self.data.len() as u64,
            etag: self.etag.clone(),
            last_modified: self.last_modified,
            user_metadata: self.user_metadata.clone(),
        }
    }
}

#[derive(Debug)]
struct OpenUpload {
    bucket: String,
    key: String,
    initiated: DateTime<Utc>,
    metadata: ObjectMetadata,
    parts: BTreeMap<u32, (Bytes, String)>,
}

#[derive(Default)]
struct Inner {
    buckets: DashMap<String, BTreeMap<String, StoredObject>>,
    uploads: DashMap<String, OpenUpload>,
    failures: Mutex<HashMap<StoreOp, (usize, FailureKind)>>,
    calls: DashMap<StoreOp, usize>,
}

/// An in-memory object store
#[derive(Clone)]
pub struct MemoryObjectStore {
    inner: Arc<Inner>,
    min_part_size: u64,
    multipart: bool,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            min_part_size: DEFAULT_MIN_PART_SIZE,
            multipart: true,
        }
    }

    /// Set the minimum part size enforced when completing multipart uploads
    pub fn with_min_part_size(mut self, size: u64) -> Self {
        self.min_part_size = size;
        self
    }

    /// Behave like a store without multipart support
    pub fn without_multipart(mut self) -> Self {
        self.multipart = false;
        self
    }

    /// Create a bucket (no-op if it exists)
    pub fn create_bucket(&self, bucket: &str) {
        self.inner.buckets.entry(bucket.to_string()).or_default();
    }

    /// Keys of every object in a bucket, in order
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.inner
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Raw stored bytes of an object
    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).map(|o| o.data.clone()))
    }

    /// Canned ACL recorded for an object
    pub fn object_acl(&self, bucket: &str, key: &str) -> Option<String> {
        self.inner
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).and_then(|o| o.canned_acl.clone()))
    }

    /// Number of multipart uploads started but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.inner.uploads.len()
    }

    /// Move an open upload's initiation time, to simulate uploads left behind earlier
    pub fn set_upload_initiated(&self, upload_id: &str, initiated: DateTime<Utc>) -> bool {
        match self.inner.uploads.get_mut(upload_id) {
            Some(mut upload) => {
                upload.initiated = initiated;
                true
            }
            None => false,
        }
    }

    /// Make the next `count` calls of `op` fail
    pub fn inject_failures(&self, op: StoreOp, count: usize, kind: FailureKind) {
        self.inner.failures.lock().insert(op, (count, kind));
    }

    /// Number of times `op` has been called
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.inner.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    fn enter(&self, op: StoreOp) -> Result<()> {
        *self.inner.calls.entry(op).or_insert(0) += 1;

        let mut failures = self.inner.failures.lock();
        if let Some((remaining, kind)) = failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                debug!(?op, remaining = *remaining, "injected store failure");
                return Err(match kind {
                    FailureKind::Transient => {
                        StoreError::Unavailable(format!("injected {:?} failure", op))
                    }
                    FailureKind::Fatal => {
                        StoreError::AccessDenied(format!("injected {:?} failure", op))
                    }
                });
            }
        }
        Ok(())
    }

    fn read_object(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let objects = self
            .inner
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.get(key).cloned().ok_or_else(|| StoreError::NoSuchKey {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    fn write_object(&self, bucket: &str, key: &str, object: StoredObject) -> Result<StoreObject> {
        let mut objects = self
            .inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        let snapshot = object.snapshot(bucket, key);
        objects.insert(key.to_string(), object);
        Ok(snapshot)
    }

    fn require_bucket(&self, bucket: &str) -> Result<()> {
        if self.inner.buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(StoreError::NoSuchBucket(bucket.to_string()))
        }
    }
}

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// ETag of a multipart object: md5 of the concatenated part digests, suffixed with the part count
fn multipart_etag(part_etags: &[&str]) -> String {
    let mut hasher = Md5::new();
    for etag in part_etags {
        match hex::decode(etag) {
            Ok(raw) => hasher.update(&raw),
            Err(_) => hasher.update(etag.as_bytes()),
        }
    }
    format!("{}-{}", hex::encode(hasher.finalize()), part_etags.len())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.inner.buckets.contains_key(bucket))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<StoreObject> {
        self.enter(StoreOp::Head)?;
        Ok(self.read_object(bucket, key)?.snapshot(bucket, key))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<StoreObject> {
        self.enter(StoreOp::Put)?;
        let etag = md5_hex(&data);
        self.write_object(bucket, key, StoredObject::new(data, etag, metadata))
    }

    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes> {
        self.enter(StoreOp::GetRange)?;
        let object = self.read_object(bucket, key)?;
        let size = object.data.len() as u64;
        if range.start > range.end || (range.start >= size && !(range.start == 0 && size == 0)) {
            return Err(StoreError::InvalidRange {
                start: range.start,
                end: range.end,
                size,
            });
        }
        let end = range.end.min(size);
        Ok(object.data.slice(range.start as usize..end as usize))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<StoreObject>> {
        self.enter(StoreOp::List)?;
        let objects = self
            .inner
            .buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;

        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| recursive || !key[prefix.len()..].contains('/'))
            .map(|(key, object)| {
                let mut summary = object.snapshot(bucket, key);
                summary.user_metadata.clear();
                summary
            })
            .collect())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.enter(StoreOp::Delete)?;
        let mut objects = self
            .inner
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }

    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<StoreObject> {
        self.enter(StoreOp::Copy)?;
        self.require_bucket(dest_bucket)?;
        let mut object = self.read_object(source_bucket, source_key)?;
        if let Some(metadata) = metadata {
            object.user_metadata = metadata.user_metadata.clone();
            object.content_type = metadata.content_type.clone().or(object.content_type);
            object.canned_acl = metadata.canned_acl.clone();
        }
        object.last_modified = Utc::now();
        self.write_object(dest_bucket, dest_key, object)
    }

    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String> {
        self.enter(StoreOp::InitiateMultipart)?;
        self.require_bucket(bucket)?;
        let upload_id = Uuid::new_v4().to_string();
        self.inner.uploads.insert(
            upload_id.clone(),
            OpenUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                initiated: Utc::now(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        debug!(bucket, key, upload_id = %upload_id, "initiated multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        self.enter(StoreOp::UploadPart)?;
        let mut upload = self
            .inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
        let etag = md5_hex(&data);
        upload.parts.insert(part_number, (data, etag.clone()));
        Ok(CompletedPart { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreObject> {
        self.enter(StoreOp::CompleteMultipart)?;

        let (data, etag, metadata) = {
            let upload = self
                .inner
                .uploads
                .get(upload_id)
                .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))?;
            if upload.bucket != bucket || upload.key != key {
                return Err(StoreError::NoSuchUpload(upload_id.to_string()));
            }
            if parts.is_empty() {
                return Err(StoreError::InvalidPart("no parts given".to_string()));
            }

            let mut data = BytesMut::new();
            let mut etags = Vec::with_capacity(parts.len());
            let mut previous = 0;
            for (i, part) in parts.iter().enumerate() {
                if part.part_number <= previous {
                    return Err(StoreError::InvalidPart("parts are not in ascending order".to_string()));
                }
                previous = part.part_number;

                let (bytes, etag) = upload
                    .parts
                    .get(&part.part_number)
                    .ok_or_else(|| StoreError::InvalidPart(format!("part {} was not uploaded", part.part_number)))?;
                if *etag != part.etag {
                    return Err(StoreError::InvalidPart(format!("ETag mismatch for part {}", part.part_number)));
                }
                if i + 1 < parts.len() && (bytes.len() as u64) < self.min_part_size {
                    return Err(StoreError::InvalidPart(format!(
                        "part {} is {} bytes, smaller than the minimum {}",
                        part.part_number,
                        bytes.len(),
                        self.min_part_size
                    )));
                }
                data.extend_from_slice(bytes);
                etags.push(etag.as_str());
            }
            (data.freeze(), multipart_etag(&etags), upload.metadata.clone())
        };

        let snapshot = self.write_object(bucket, key, StoredObject::new(data, etag, &metadata))?;
        self.inner.uploads.remove(upload_id);
        debug!(bucket, key, upload_id, parts = parts.len(), "completed multipart upload");
        Ok(snapshot)
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &str) -> Result<()> {
        self.enter(StoreOp::AbortMultipart)?;
        self.inner
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NoSuchUpload(upload_id.to_string()))
    }

    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>> {
        self.enter(StoreOp::ListUploads)?;
        self.require_bucket(bucket)?;
        let mut uploads: Vec<PendingUpload> = self
            .inner
            .uploads
            .iter()
            .filter(|entry| entry.value().bucket == bucket && entry.value().key.starts_with(prefix))
            .map(|entry| {
                let (upload_id, upload) = entry.pair();
                PendingUpload {
                    bucket: upload.bucket.clone(),
                    key: upload.key.clone(),
                    upload_id: upload_id.clone(),
                    initiated: upload.initiated,
                }
            })
            .collect();
        uploads.sort_by(|a, b| (&a.key, a.initiated).cmp(&(&b.key, b.initiated)));
        Ok(uploads)
    }

    fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    fn supports_multipart(&self) -> bool {
        self.multipart
    }
}
