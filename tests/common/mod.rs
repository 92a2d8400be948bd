//! Shared fixtures for the integration suites

#![allow(dead_code)]

use cloudstore::core::{
    CloudStoreClient, EngineConfig, FaultInjector, OperationHandle, OperationKind, RetryEvent,
};
use cloudstore::crypto::{InMemoryKeyProvider, KeyPair};
use cloudstore::store::MemoryObjectStore;
use rand::RngCore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

pub const BUCKET: &str = "test-bucket";

/// Smallest part size the test store accepts; one cipher block
pub const MIN_PART: u64 = 16;

pub const KEY_NAMES: [&str; 5] = ["k1", "k2", "k3", "k4", "k5"];

/// Five 1024-bit key pairs, generated once per test binary
pub fn key_pair(index: usize) -> &'static KeyPair {
    static PAIRS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    &PAIRS.get_or_init(|| {
        (0..KEY_NAMES.len())
            .map(|_| KeyPair::generate(1024).expect("generate test key"))
            .collect()
    })[index]
}

/// Provider holding the named key pairs
pub fn provider(names: &[&str]) -> Arc<InMemoryKeyProvider> {
    let mut provider = InMemoryKeyProvider::new();
    for name in names {
        let index = KEY_NAMES
            .iter()
            .position(|n| n == name)
            .expect("known key name");
        provider = provider.with_key_pair(*name, key_pair(index));
    }
    Arc::new(provider)
}

pub fn store() -> Arc<MemoryObjectStore> {
    let store = MemoryObjectStore::new().with_min_part_size(MIN_PART);
    store.create_bucket(BUCKET);
    Arc::new(store)
}

/// Retries without backoff delays
pub fn config(retry_count: u32) -> EngineConfig {
    EngineConfig {
        chunk_size: None,
        part_workers: 4,
        object_workers: 4,
        retry_count,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        key_dirs: Vec::new(),
    }
}

pub fn client(store: &Arc<MemoryObjectStore>) -> CloudStoreClient {
    CloudStoreClient::builder(store.clone())
        .config(config(10))
        .key_provider(provider(&KEY_NAMES))
        .build()
        .unwrap()
}

/// Injector that cancels an operation the first time a store call of one
/// kind is attempted. The call itself goes ahead.
pub struct CancelOnFirst {
    kind: OperationKind,
    cancel: OnceLock<Box<dyn Fn() + Send + Sync>>,
}

impl CancelOnFirst {
    pub fn new(kind: OperationKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            cancel: OnceLock::new(),
        })
    }

    /// Cancel `handle` once triggered
    pub fn arm<T>(&self, handle: &OperationHandle<T>) {
        let token = handle.cancellation_token();
        let _ = self.cancel.set(Box::new(move || token.cancel()));
    }
}

impl FaultInjector for CancelOnFirst {
    fn should_abort(&self, kind: OperationKind, _call_id: &str) -> bool {
        if kind == self.kind {
            if let Some(cancel) = self.cancel.get() {
                cancel();
            }
        }
        false
    }
}

/// Client running one object at a time, cancelled by `trigger`
pub fn cancelling_client(
    store: &Arc<MemoryObjectStore>,
    trigger: &Arc<CancelOnFirst>,
) -> CloudStoreClient {
    let mut config = config(3);
    config.object_workers = 1;
    CloudStoreClient::builder(store.clone())
        .config(config)
        .key_provider(provider(&KEY_NAMES))
        .fault_injector(trigger.clone())
        .build()
        .unwrap()
}

/// Count retry events on a client
pub fn count_retries(client: &CloudStoreClient) -> Arc<AtomicU32> {
    let count = Arc::new(AtomicU32::new(0));
    let seen = count.clone();
    client.add_retry_listener(Arc::new(move |_event: &RetryEvent| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    count
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, data).unwrap();
    path
}

pub fn uri(key: &str) -> cloudstore::StoreUri {
    cloudstore::StoreUri::parse(&format!("s3://{}/{}", BUCKET, key)).unwrap()
}
