//! Client facade: every operation runs in the background behind an
//! [`OperationHandle`]

use crate::config::EngineConfig;
use crate::engine::{ensure_active, Engine};
use crate::error::Result;
use crate::handle::OperationHandle;
use crate::options::{
    CopyOptions, DeleteOptions, DownloadOptions, EncryptionKeyOptions, PendingUploadsOptions,
    RenameOptions, UploadOptions,
};
use crate::retry::{FaultInjector, NoFaults, RetryExecutor, RetryListener, RetryListeners};
use cloudstore_crypto::{DirectoryKeyProvider, KeyProvider};
use cloudstore_store::{ObjectStore, PendingUpload, StoreObject, StoreUri};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for [`CloudStoreClient`]
pub struct ClientBuilder {
    store: Arc<dyn ObjectStore>,
    keys: Option<Arc<dyn KeyProvider>>,
    config: EngineConfig,
    injector: Arc<dyn FaultInjector>,
    listeners: RetryListeners,
}

impl ClientBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Key provider; defaults to the configured key directories
    pub fn key_provider(mut self, keys: Arc<dyn KeyProvider>) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Attempts per store call, including the first
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    pub fn fault_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn retry_listener(self, listener: RetryListener) -> Self {
        self.listeners.add(listener);
        self
    }

    pub fn build(self) -> Result<CloudStoreClient> {
        self.config.validate()?;
        let keys = match self.keys {
            Some(keys) => keys,
            None => Arc::new(DirectoryKeyProvider::with_dirs(self.config.key_dirs.clone())),
        };
        let executor = RetryExecutor::new(self.config.retry_policy())
            .with_fault_injector(self.injector)
            .with_listeners(self.listeners);

        Ok(CloudStoreClient {
            engine: Arc::new(Engine {
                store: self.store,
                keys,
                config: self.config,
                executor,
            }),
        })
    }
}

/// Entry point for transfers and recursive operations.
///
/// Operations are spawned on the current tokio runtime, so the methods must
/// be called from within one.
#[derive(Clone)]
pub struct CloudStoreClient {
    engine: Arc<Engine>,
}

impl fmt::Debug for CloudStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudStoreClient")
            .field("engine", &self.engine)
            .finish()
    }
}

impl CloudStoreClient {
    pub fn builder(store: Arc<dyn ObjectStore>) -> ClientBuilder {
        ClientBuilder {
            store,
            keys: None,
            config: EngineConfig::default(),
            injector: Arc::new(NoFaults),
            listeners: RetryListeners::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.engine.store
    }

    /// Register a listener notified before every retry
    pub fn add_retry_listener(&self, listener: RetryListener) {
        self.engine.executor.listeners().add(listener);
    }

    fn spawn<T, F, Fut>(&self, operation: F) -> OperationHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<Engine>, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        OperationHandle::spawn(move |token| operation(engine, token))
    }

    /// Upload a file. Resolves to `None` on a dry run.
    pub fn upload(&self, options: UploadOptions) -> OperationHandle<Option<StoreObject>> {
        self.spawn(|engine, cancel| async move { engine.upload(&options, &cancel).await })
    }

    /// Upload a local directory tree under a prefix
    pub fn upload_directory(
        &self,
        options: UploadOptions,
    ) -> OperationHandle<Option<Vec<StoreObject>>> {
        self.spawn(|engine, cancel| async move { engine.upload_directory(&options, &cancel).await })
    }

    /// Download an object. Resolves to `None` on a dry run.
    pub fn download(&self, options: DownloadOptions) -> OperationHandle<Option<StoreObject>> {
        self.spawn(|engine, cancel| async move { engine.download(&options, &cancel).await })
    }

    /// Download every object under a prefix into a local directory
    pub fn download_directory(
        &self,
        options: DownloadOptions,
    ) -> OperationHandle<Option<Vec<StoreObject>>> {
        self.spawn(
            |engine, cancel| async move { engine.download_directory(&options, &cancel).await },
        )
    }

    pub fn copy(&self, options: CopyOptions) -> OperationHandle<Option<StoreObject>> {
        self.spawn(|engine, cancel| async move { engine.copy(&options, &cancel).await })
    }

    pub fn copy_recursively(
        &self,
        options: CopyOptions,
    ) -> OperationHandle<Option<Vec<StoreObject>>> {
        self.spawn(|engine, cancel| async move { engine.copy_recursively(&options, &cancel).await })
    }

    pub fn rename(&self, options: RenameOptions) -> OperationHandle<Option<StoreObject>> {
        self.spawn(|engine, cancel| async move { engine.rename(&options, &cancel).await })
    }

    pub fn rename_recursively(
        &self,
        options: RenameOptions,
    ) -> OperationHandle<Option<Vec<StoreObject>>> {
        self.spawn(
            |engine, cancel| async move { engine.rename_recursively(&options, &cancel).await },
        )
    }

    pub fn delete(&self, options: DeleteOptions) -> OperationHandle<Option<StoreObject>> {
        self.spawn(|engine, cancel| async move { engine.delete(&options, &cancel).await })
    }

    pub fn delete_recursively(
        &self,
        options: DeleteOptions,
    ) -> OperationHandle<Option<Vec<StoreObject>>> {
        self.spawn(
            |engine, cancel| async move { engine.delete_recursively(&options, &cancel).await },
        )
    }

    /// Grant another recipient key access to an encrypted object
    pub fn add_encryption_key(&self, options: EncryptionKeyOptions) -> OperationHandle<StoreObject> {
        self.spawn(|engine, cancel| async move { engine.add_encryption_key(&options, &cancel).await })
    }

    /// Revoke a recipient key; the last key cannot be removed
    pub fn remove_encryption_key(
        &self,
        options: EncryptionKeyOptions,
    ) -> OperationHandle<StoreObject> {
        self.spawn(|engine, cancel| async move { engine.remove_encryption_key(&options, &cancel).await })
    }

    pub fn exists(&self, uri: StoreUri) -> OperationHandle<bool> {
        self.spawn(|engine, cancel| async move {
            ensure_active(&cancel)?;
            engine.exists(&uri).await
        })
    }

    pub fn list(&self, uri: StoreUri, recursive: bool) -> OperationHandle<Vec<StoreObject>> {
        self.spawn(|engine, cancel| async move {
            ensure_active(&cancel)?;
            engine.require_bucket(&uri).await?;
            engine.list(&uri, recursive).await
        })
    }

    /// Multipart uploads still open under a prefix
    pub fn list_pending_uploads(&self, target: StoreUri) -> OperationHandle<Vec<PendingUpload>> {
        self.spawn(|engine, cancel| async move {
            ensure_active(&cancel)?;
            engine.list_pending_uploads(&target).await
        })
    }

    /// Abort pending uploads by id and/or age. Resolves to `None` on a dry run.
    pub fn abort_pending_uploads(
        &self,
        options: PendingUploadsOptions,
    ) -> OperationHandle<Option<Vec<PendingUpload>>> {
        self.spawn(
            |engine, cancel| async move { engine.abort_pending_uploads(&options, &cancel).await },
        )
    }
}
