//! Store URI addressing: `scheme://bucket/key`

use crate::{Result, StoreError};
use std::fmt;
use std::str::FromStr;

/// Store flavours addressed by URI scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Amazon S3 and S3-compatible stores
    S3,
    /// Google Cloud Storage
    Gs,
}

impl Scheme {
    /// URI scheme string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::Gs => "gs",
        }
    }
}

impl FromStr for Scheme {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "gs" => Ok(Self::Gs),
            other => Err(StoreError::InvalidUri {
                uri: s.to_string(),
                reason: format!("unsupported scheme '{}'", other),
            }),
        }
    }
}

/// Location of an object or a key prefix. A key ending in `/` denotes a
/// directory-shaped prefix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreUri {
    scheme: Scheme,
    bucket: String,
    key: String,
}

impl StoreUri {
    /// Build a URI from its parts
    pub fn new(scheme: Scheme, bucket: impl Into<String>, key: impl Into<String>) -> Result<Self> {
        let bucket = bucket.into();
        let key = key.into();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StoreError::InvalidUri {
                uri: format!("{}://{}/{}", scheme.as_str(), bucket, key),
                reason: "bucket name is missing or malformed".to_string(),
            });
        }
        Ok(Self {
            scheme,
            bucket,
            key: key.trim_start_matches('/').to_string(),
        })
    }

    /// Parse `scheme://bucket/key`
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = |reason: &str| StoreError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("expected scheme://bucket/key"))?;
        let scheme: Scheme = scheme.parse()?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        Self::new(scheme, bucket, key).map_err(|_| invalid("bucket name is missing"))
    }

    /// URI scheme
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Object key or prefix (may be empty for the bucket root)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this URI names a directory-shaped prefix
    pub fn is_prefix(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    /// Last path component of the key, ignoring a trailing `/`
    pub fn file_name(&self) -> &str {
        let trimmed = self.key.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }

    /// Key up to and including the last `/` (empty at the bucket root)
    pub fn parent_prefix(&self) -> &str {
        match self.key.rfind('/') {
            Some(i) => &self.key[..=i],
            None => "",
        }
    }

    /// Same bucket, different key
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key: key.into().trim_start_matches('/').to_string(),
        }
    }

    /// Append a relative path to this prefix
    pub fn join(&self, relative: &str) -> Self {
        let mut key = self.key.clone();
        if !key.is_empty() && !key.ends_with('/') {
            key.push('/');
        }
        key.push_str(relative.trim_start_matches('/'));
        self.with_key(key)
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme.as_str(), self.bucket, self.key)
    }
}

impl FromStr for StoreUri {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_uri() {
        let uri = StoreUri::parse("s3://bucket/a/b/file.txt").unwrap();
        assert_eq!(uri.scheme(), Scheme::S3);
        assert_eq!(uri.bucket(), "bucket");
        assert_eq!(uri.key(), "a/b/file.txt");
        assert!(!uri.is_prefix());
        assert_eq!(uri.file_name(), "file.txt");
        assert_eq!(uri.parent_prefix(), "a/b/");
        assert_eq!(uri.to_string(), "s3://bucket/a/b/file.txt");
    }

    #[test]
    fn test_parse_prefix_uri() {
        let uri: StoreUri = "gs://bucket/dir/".parse().unwrap();
        assert_eq!(uri.scheme(), Scheme::Gs);
        assert!(uri.is_prefix());
        assert_eq!(uri.file_name(), "dir");

        let root = StoreUri::parse("s3://bucket").unwrap();
        assert_eq!(root.key(), "");
        assert!(root.is_prefix());
    }

    #[test]
    fn test_invalid_uris() {
        assert!(StoreUri::parse("bucket/key").is_err());
        assert!(StoreUri::parse("ftp://bucket/key").is_err());
        assert!(StoreUri::parse("s3:///key").is_err());
    }

    #[test]
    fn test_join() {
        let base = StoreUri::parse("s3://b/dir").unwrap();
        assert_eq!(base.join("x/y").key(), "dir/x/y");
        let base = StoreUri::parse("s3://b/dir/").unwrap();
        assert_eq!(base.join("/x").key(), "dir/x");
        let root = StoreUri::parse("s3://b/").unwrap();
        assert_eq!(root.join("x").key(), "x");
    }
}
