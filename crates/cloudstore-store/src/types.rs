//! Object store types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default minimum size of every multipart part except the last (5 MiB)
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Snapshot of an object in the store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreObject {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Stored size in bytes
    pub size: u64,
    /// ETag reported by the store
    pub etag: String,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
    /// User metadata (empty in listings)
    #[serde(default)]
    pub user_metadata: HashMap<String, String>,
}

impl StoreObject {
    /// Last path component of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Metadata attached to an object when it is written
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Content type
    pub content_type: Option<String>,
    /// Canned ACL, passed through to the store uninterpreted
    pub canned_acl: Option<String>,
    /// User metadata
    pub user_metadata: HashMap<String, String>,
}

impl ObjectMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the canned ACL
    pub fn with_canned_acl(mut self, acl: Option<String>) -> Self {
        self.canned_acl = acl;
        self
    }

    /// Replace the user metadata
    pub fn with_user_metadata(mut self, user_metadata: HashMap<String, String>) -> Self {
        self.user_metadata = user_metadata;
        self
    }

    /// Add a single user metadata entry
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_metadata.insert(key.into(), value.into());
        self
    }
}

/// A part acknowledged by the store during a multipart upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: u32,
    /// ETag returned for the part
    pub etag: String,
}

/// A multipart upload that was initiated but neither completed nor aborted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    /// Bucket name
    pub bucket: String,
    /// Key the upload would create
    pub key: String,
    /// Store-assigned upload id
    pub upload_id: String,
    /// When the upload was initiated
    pub initiated: DateTime<Utc>,
}
