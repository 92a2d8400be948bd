//! Per-operation options
//!
//! Each operation takes its own immutable options value. Required inputs go
//! through `new`; optional settings are added with `with_*` builders, the
//! fallible ones returning `Result`.

use crate::error::{Error, Result};
use crate::progress::ProgressListener;
use cloudstore_crypto::keys::validate_key_name;
use chrono::{DateTime, Utc};
use cloudstore_store::StoreUri;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn check_key_name(name: &str) -> Result<()> {
    validate_key_name(name).map_err(Error::from)
}

fn check_chunk_size(size: u64) -> Result<()> {
    if size == 0 {
        return Err(Error::usage("Chunk size must be positive"));
    }
    Ok(())
}

fn listener_debug(listener: &Option<Arc<dyn ProgressListener>>) -> &'static str {
    if listener.is_some() {
        "Some(..)"
    } else {
        "None"
    }
}

/// Upload of a local file, or of a directory tree when recursive
#[derive(Clone)]
pub struct UploadOptions {
    file: PathBuf,
    destination: StoreUri,
    chunk_size: Option<u64>,
    encryption_key: Option<String>,
    canned_acl: Option<String>,
    dry_run: bool,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl UploadOptions {
    /// A destination ending in `/` receives the file under its own name
    pub fn new(file: impl Into<PathBuf>, destination: StoreUri) -> Self {
        Self {
            file: file.into(),
            destination,
            chunk_size: None,
            encryption_key: None,
            canned_acl: None,
            dry_run: false,
            progress: None,
        }
    }

    pub fn with_chunk_size(mut self, size: u64) -> Result<Self> {
        check_chunk_size(size)?;
        self.chunk_size = Some(size);
        Ok(self)
    }

    /// Encrypt for the named recipient key
    pub fn with_encryption_key(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        check_key_name(&name)?;
        self.encryption_key = Some(name);
        Ok(self)
    }

    /// Canned ACL passed through to the store
    pub fn with_canned_acl(mut self, acl: impl Into<String>) -> Self {
        self.canned_acl = Some(acl.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn destination(&self) -> &StoreUri {
        &self.destination
    }

    pub fn chunk_size(&self) -> Option<u64> {
        self.chunk_size
    }

    pub fn encryption_key(&self) -> Option<&str> {
        self.encryption_key.as_deref()
    }

    pub fn canned_acl(&self) -> Option<&str> {
        self.canned_acl.as_deref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn progress(&self) -> Option<&Arc<dyn ProgressListener>> {
        self.progress.as_ref()
    }

    /// Same settings for another file and destination
    pub(crate) fn for_file(&self, file: PathBuf, destination: StoreUri) -> Self {
        Self {
            file,
            destination,
            ..self.clone()
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("file", &self.file)
            .field("destination", &self.destination)
            .field("chunk_size", &self.chunk_size)
            .field("encryption_key", &self.encryption_key)
            .field("canned_acl", &self.canned_acl)
            .field("dry_run", &self.dry_run)
            .field("progress", &listener_debug(&self.progress))
            .finish()
    }
}

/// Download of an object, or of every object under a prefix
#[derive(Clone)]
pub struct DownloadOptions {
    source: StoreUri,
    file: PathBuf,
    overwrite: bool,
    dry_run: bool,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl DownloadOptions {
    /// An existing directory as `file` receives the object under its own name
    pub fn new(source: StoreUri, file: impl Into<PathBuf>) -> Self {
        Self {
            source,
            file: file.into(),
            overwrite: false,
            dry_run: false,
            progress: None,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_progress(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress = Some(listener);
        self
    }

    pub fn source(&self) -> &StoreUri {
        &self.source
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn progress(&self) -> Option<&Arc<dyn ProgressListener>> {
        self.progress.as_ref()
    }

    pub(crate) fn for_object(&self, source: StoreUri, file: PathBuf) -> Self {
        Self {
            source,
            file,
            ..self.clone()
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("source", &self.source)
            .field("file", &self.file)
            .field("overwrite", &self.overwrite)
            .field("dry_run", &self.dry_run)
            .field("progress", &listener_debug(&self.progress))
            .finish()
    }
}

/// Server-side copy of an object or a prefix
#[derive(Clone, Debug)]
pub struct CopyOptions {
    source: StoreUri,
    destination: StoreUri,
    canned_acl: Option<String>,
    dry_run: bool,
    ignore_abort_injection: bool,
}

impl CopyOptions {
    pub fn new(source: StoreUri, destination: StoreUri) -> Self {
        Self {
            source,
            destination,
            canned_acl: None,
            dry_run: false,
            ignore_abort_injection: false,
        }
    }

    pub fn with_canned_acl(mut self, acl: impl Into<String>) -> Self {
        self.canned_acl = Some(acl.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Exempt this copy from fault injection
    pub fn with_ignore_abort_injection(mut self, ignore: bool) -> Self {
        self.ignore_abort_injection = ignore;
        self
    }

    pub fn source(&self) -> &StoreUri {
        &self.source
    }

    pub fn destination(&self) -> &StoreUri {
        &self.destination
    }

    pub fn canned_acl(&self) -> Option<&str> {
        self.canned_acl.as_deref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn ignore_abort_injection(&self) -> bool {
        self.ignore_abort_injection
    }
}

/// Copy-then-delete move of an object or a prefix
#[derive(Clone, Debug)]
pub struct RenameOptions {
    source: StoreUri,
    destination: StoreUri,
    overwrite: bool,
    canned_acl: Option<String>,
    dry_run: bool,
}

impl RenameOptions {
    pub fn new(source: StoreUri, destination: StoreUri) -> Self {
        Self {
            source,
            destination,
            overwrite: true,
            canned_acl: None,
            dry_run: false,
        }
    }

    /// Allow replacing an existing destination object (default true)
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_canned_acl(mut self, acl: impl Into<String>) -> Self {
        self.canned_acl = Some(acl.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn source(&self) -> &StoreUri {
        &self.source
    }

    pub fn destination(&self) -> &StoreUri {
        &self.destination
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn canned_acl(&self) -> Option<&str> {
        self.canned_acl.as_deref()
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Deletion of an object or a prefix
#[derive(Clone, Debug)]
pub struct DeleteOptions {
    target: StoreUri,
    dry_run: bool,
    ignore_abort_injection: bool,
}

impl DeleteOptions {
    pub fn new(target: StoreUri) -> Self {
        Self {
            target,
            dry_run: false,
            ignore_abort_injection: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_ignore_abort_injection(mut self, ignore: bool) -> Self {
        self.ignore_abort_injection = ignore;
        self
    }

    pub fn target(&self) -> &StoreUri {
        &self.target
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn ignore_abort_injection(&self) -> bool {
        self.ignore_abort_injection
    }
}

/// Adding or removing a recipient key on an encrypted object
#[derive(Clone, Debug)]
pub struct EncryptionKeyOptions {
    object: StoreUri,
    key_name: String,
}

impl EncryptionKeyOptions {
    pub fn new(object: StoreUri, key_name: impl Into<String>) -> Result<Self> {
        let key_name = key_name.into();
        check_key_name(&key_name)?;
        if object.is_prefix() {
            return Err(Error::usage(format!(
                "Key management needs a single object, got prefix '{}'",
                object
            )));
        }
        Ok(Self { object, key_name })
    }

    pub fn object(&self) -> &StoreUri {
        &self.object
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }
}

/// Selection of pending multipart uploads to abort
///
/// The target's key is a prefix: every open upload whose key starts with it
/// is a candidate. At least one of an upload id or a cutoff time is needed;
/// with both, the upload with that id is aborted only if it is old enough.
#[derive(Clone, Debug)]
pub struct PendingUploadsOptions {
    target: StoreUri,
    upload_id: Option<String>,
    older_than: Option<DateTime<Utc>>,
    dry_run: bool,
}

impl PendingUploadsOptions {
    pub fn new(target: StoreUri) -> Self {
        Self {
            target,
            upload_id: None,
            older_than: None,
            dry_run: false,
        }
    }

    pub fn with_upload_id(mut self, upload_id: impl Into<String>) -> Self {
        self.upload_id = Some(upload_id.into());
        self
    }

    /// Only uploads initiated strictly before this time
    pub fn with_older_than(mut self, cutoff: DateTime<Utc>) -> Self {
        self.older_than = Some(cutoff);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn target(&self) -> &StoreUri {
        &self.target
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn older_than(&self) -> Option<DateTime<Utc>> {
        self.older_than
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}
