//! Envelope encryption and recipient management through the client

mod common;

use cloudstore::core::{DownloadOptions, EncryptionKeyOptions, Error, UploadOptions};
use cloudstore::crypto::{CryptoError, Envelope};
use cloudstore::store::{MemoryObjectStore, ObjectMetadata, ObjectStore};
use cloudstore::CloudStoreClient;
use common::*;
use std::sync::Arc;

async fn upload_encrypted(
    client: &CloudStoreClient,
    dir: &std::path::Path,
    key: &str,
    data: &[u8],
) {
    let file = write_file(dir, "plain", data);
    let options = UploadOptions::new(&file, uri(key))
        .with_chunk_size(32)
        .unwrap()
        .with_encryption_key("k1")
        .unwrap();
    client.upload(options).await.unwrap();
}

async fn recipients(store: &Arc<MemoryObjectStore>, key: &str) -> Vec<String> {
    let head = store.head_object(BUCKET, key).await.unwrap();
    Envelope::from_metadata(&head.user_metadata)
        .unwrap()
        .unwrap()
        .key_names()
        .map(String::from)
        .collect()
}

fn key_options(key: &str, name: &str) -> EncryptionKeyOptions {
    EncryptionKeyOptions::new(uri(key), name).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_recipient_lifecycle() {
    let store = store();
    let client = client(&store);
    let dir = tempfile::tempdir().unwrap();
    let data = random_bytes(90);
    upload_encrypted(&client, dir.path(), "secret", &data).await;
    let stored = store.object_data(BUCKET, "secret").unwrap();

    for name in ["k2", "k3", "k4"] {
        client.add_encryption_key(key_options("secret", name)).await.unwrap();
    }
    assert_eq!(recipients(&store, "secret").await, vec!["k1", "k2", "k3", "k4"]);

    let err = client
        .add_encryption_key(key_options("secret", "k5"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No more than 4 keys are allowed");

    let err = client
        .add_encryption_key(key_options("secret", "k2"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));

    for name in ["k1", "k3", "k4"] {
        client.remove_encryption_key(key_options("secret", name)).await.unwrap();
    }
    assert_eq!(recipients(&store, "secret").await, vec!["k2"]);

    let err = client
        .remove_encryption_key(key_options("secret", "k2"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Cannot remove the last remaining key");

    // Recipient changes rewrite metadata only
    assert_eq!(store.object_data(BUCKET, "secret").unwrap(), stored);

    let target = dir.path().join("out");
    client
        .download(DownloadOptions::new(uri("secret"), &target))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), data);
}

#[tokio::test]
async fn test_added_recipient_can_decrypt_alone() {
    let store = store();
    let client = client(&store);
    let dir = tempfile::tempdir().unwrap();
    let data = random_bytes(70);
    upload_encrypted(&client, dir.path(), "shared", &data).await;
    client.add_encryption_key(key_options("shared", "k3")).await.unwrap();

    let reader = CloudStoreClient::builder(store.clone())
        .config(config(3))
        .key_provider(provider(&["k3"]))
        .build()
        .unwrap();
    let target = dir.path().join("read-by-k3");
    reader
        .download(DownloadOptions::new(uri("shared"), &target))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), data);

    let outsider = CloudStoreClient::builder(store.clone())
        .config(config(3))
        .key_provider(provider(&["k5"]))
        .build()
        .unwrap();
    let err = outsider
        .download(DownloadOptions::new(uri("shared"), dir.path().join("nope")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Crypto(CryptoError::NoEligiblePrivateKey)));
    assert!(!dir.path().join("nope").exists());
}

#[tokio::test]
async fn test_removed_recipient_loses_access() {
    let store = store();
    let client = client(&store);
    let dir = tempfile::tempdir().unwrap();
    upload_encrypted(&client, dir.path(), "revoked", &random_bytes(40)).await;
    client.add_encryption_key(key_options("revoked", "k2")).await.unwrap();
    client.remove_encryption_key(key_options("revoked", "k1")).await.unwrap();

    let former = CloudStoreClient::builder(store.clone())
        .config(config(3))
        .key_provider(provider(&["k1"]))
        .build()
        .unwrap();
    let err = former
        .download(DownloadOptions::new(uri("revoked"), dir.path().join("out")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Crypto(CryptoError::PrivateKeyUnavailable(ref name)) if name == "k2"
    ));
}

#[tokio::test]
async fn test_key_management_errors() {
    let store = store();
    let client = client(&store);
    store
        .put_object(BUCKET, "plain", "not secret".into(), &ObjectMetadata::new())
        .await
        .unwrap();

    let err = client
        .add_encryption_key(key_options("plain", "k2"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("doesn't seem to be encrypted"));

    let err = client
        .add_encryption_key(key_options("missing", "k2"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Object not found"));

    let dir = tempfile::tempdir().unwrap();
    upload_encrypted(&client, dir.path(), "secret", b"payload").await;
    let limited = CloudStoreClient::builder(store.clone())
        .config(config(3))
        .key_provider(provider(&["k1"]))
        .build()
        .unwrap();
    let err = limited
        .add_encryption_key(key_options("secret", "k2"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Missing encryption key 'k2'");

    let err = client
        .remove_encryption_key(key_options("secret", "k3"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Crypto(CryptoError::KeyNotFound(_))));

    assert!(EncryptionKeyOptions::new(uri("dir/"), "k1").is_err());
    assert!(EncryptionKeyOptions::new(uri("secret"), "bad,name").is_err());
}

#[tokio::test]
async fn test_encrypted_copy_keeps_envelope() {
    let store = store();
    let client = client(&store);
    let dir = tempfile::tempdir().unwrap();
    let data = random_bytes(50);
    upload_encrypted(&client, dir.path(), "a/secret", &data).await;

    client
        .copy(cloudstore::CopyOptions::new(uri("a/secret"), uri("b/secret")))
        .await
        .unwrap();
    assert_eq!(recipients(&store, "b/secret").await, vec!["k1"]);

    let target = dir.path().join("copied");
    client
        .download(DownloadOptions::new(uri("b/secret"), &target))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), data);
}

#[tokio::test]
async fn test_cancelled_key_change_leaves_envelope() {
    let store = store();
    let client = client(&store);
    let dir = tempfile::tempdir().unwrap();
    upload_encrypted(&client, dir.path(), "guarded", &random_bytes(40)).await;
    client.add_encryption_key(key_options("guarded", "k2")).await.unwrap();

    let handle = client.add_encryption_key(key_options("guarded", "k3"));
    handle.cancel();
    assert!(matches!(handle.await, Err(Error::Cancelled)));

    let handle = client.remove_encryption_key(key_options("guarded", "k2"));
    handle.cancel();
    assert!(matches!(handle.await, Err(Error::Cancelled)));

    assert_eq!(recipients(&store, "guarded").await, vec!["k1", "k2"]);
}
