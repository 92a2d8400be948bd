//! Shared engine state and the store calls every operation builds on

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::retry::{OperationKind, RetriableTask, RetryExecutor};
use cloudstore_crypto::KeyProvider;
use cloudstore_store::{ObjectMetadata, ObjectStore, StoreError, StoreObject, StoreUri};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Store, keys, configuration and retry executor shared by all operations
/// of one client
pub(crate) struct Engine {
    pub store: Arc<dyn ObjectStore>,
    pub keys: Arc<dyn KeyProvider>,
    pub config: EngineConfig,
    pub executor: RetryExecutor,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

/// Usage error for a missing bucket, passing other errors through
pub(crate) fn bucket_usage(error: Error) -> Error {
    if error.is_no_such_bucket() {
        Error::Usage(error.to_string())
    } else {
        error
    }
}

/// Destination for a single object: a prefix receives the source's file name
pub(crate) fn resolve_destination(destination: &StoreUri, file_name: &str) -> StoreUri {
    if destination.is_prefix() {
        destination.join(file_name)
    } else {
        destination.clone()
    }
}

pub(crate) fn require_object_uri(uri: &StoreUri) -> Result<()> {
    if uri.is_prefix() {
        return Err(Error::usage(format!(
            "Source key should be fully qualified: {}",
            uri
        )));
    }
    Ok(())
}

pub(crate) fn require_prefix_destination(uri: &StoreUri) -> Result<()> {
    if !uri.is_prefix() {
        return Err(Error::usage(format!(
            "Destination directory key should end with a '/': {}",
            uri
        )));
    }
    Ok(())
}

/// `Error::Cancelled` once the operation's token has fired; checked before
/// every mutating store call
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

impl Engine {
    /// Fail with a usage error unless the bucket exists
    pub async fn require_bucket(&self, uri: &StoreUri) -> Result<()> {
        let task = RetriableTask::new(OperationKind::Metadata, uri.to_string());
        let store = &self.store;
        let bucket = uri.bucket();
        let exists = self
            .executor
            .execute(&task, || async move {
                store.bucket_exists(bucket).await.map_err(Error::from)
            })
            .await?;
        if !exists {
            return Err(Error::Usage(
                StoreError::NoSuchBucket(bucket.to_string()).to_string(),
            ));
        }
        Ok(())
    }

    /// Head an object; `None` when it does not exist
    pub async fn head(&self, uri: &StoreUri) -> Result<Option<StoreObject>> {
        let task = RetriableTask::new(OperationKind::Metadata, uri.to_string());
        let store = &self.store;
        let result = self
            .executor
            .execute(&task, || async move {
                store
                    .head_object(uri.bucket(), uri.key())
                    .await
                    .map_err(Error::from)
            })
            .await;
        match result {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_no_such_key() => Ok(None),
            Err(e) => Err(bucket_usage(e)),
        }
    }

    /// Head an object that must exist
    pub async fn head_required(&self, uri: &StoreUri) -> Result<StoreObject> {
        self.head(uri)
            .await?
            .ok_or_else(|| Error::usage(format!("Object not found at {}", uri)))
    }

    pub async fn exists(&self, uri: &StoreUri) -> Result<bool> {
        Ok(self.head(uri).await?.is_some())
    }

    /// Every object under a prefix (recursive) or directly in it
    pub async fn list(&self, uri: &StoreUri, recursive: bool) -> Result<Vec<StoreObject>> {
        let task = RetriableTask::new(OperationKind::Metadata, uri.to_string());
        let store = &self.store;
        self.executor
            .execute(&task, || async move {
                store
                    .list_objects(uri.bucket(), uri.key(), recursive)
                    .await
                    .map_err(Error::from)
            })
            .await
            .map_err(bucket_usage)
    }

    /// Server-side copy of one object, retried as a copy
    pub async fn copy_one(
        &self,
        source: &StoreUri,
        destination: &StoreUri,
        metadata: Option<&ObjectMetadata>,
        ignore_abort_injection: bool,
    ) -> Result<StoreObject> {
        debug!(%source, %destination, "Copying object");
        let task = RetriableTask::new(OperationKind::Copy, source.to_string())
            .ignore_abort_injection(ignore_abort_injection);
        let store = &self.store;
        self.executor
            .execute(&task, || async move {
                store
                    .copy_object(
                        source.bucket(),
                        source.key(),
                        destination.bucket(),
                        destination.key(),
                        metadata,
                    )
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    /// Delete one object, retried as a delete
    pub async fn delete_one(&self, uri: &StoreUri, ignore_abort_injection: bool) -> Result<()> {
        debug!(%uri, "Deleting object");
        let task = RetriableTask::new(OperationKind::Delete, uri.to_string())
            .ignore_abort_injection(ignore_abort_injection);
        let store = &self.store;
        self.executor
            .execute(&task, || async move {
                store
                    .delete_object(uri.bucket(), uri.key())
                    .await
                    .map_err(Error::from)
            })
            .await
    }
}
