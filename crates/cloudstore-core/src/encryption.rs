//! Adding and removing recipient keys on encrypted objects
//!
//! The content key never changes: adding a recipient unwraps it with a
//! locally available private key and wraps it again for the new public key.
//! The updated envelope is written back by copying the object onto itself
//! with replaced metadata, so the content is never downloaded.

use crate::engine::{ensure_active, Engine};
use crate::error::Result;
use crate::options::EncryptionKeyOptions;
use cloudstore_crypto::{CryptoError, Envelope};
use cloudstore_store::{ObjectMetadata, StoreObject, StoreUri};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

impl Engine {
    #[instrument(skip(self, options, cancel), fields(object = %options.object(), key = options.key_name()))]
    pub async fn add_encryption_key(
        self: &Arc<Self>,
        options: &EncryptionKeyOptions,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let (head, mut envelope) = self.load_envelope(options.object()).await?;
        envelope.add_recipient(&*self.keys, options.key_name())?;
        ensure_active(cancel)?;
        let object = self.store_envelope(options.object(), &head, &envelope).await?;
        info!("Added key '{}' to {}", options.key_name(), options.object());
        Ok(object)
    }

    #[instrument(skip(self, options, cancel), fields(object = %options.object(), key = options.key_name()))]
    pub async fn remove_encryption_key(
        self: &Arc<Self>,
        options: &EncryptionKeyOptions,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let (head, mut envelope) = self.load_envelope(options.object()).await?;
        envelope.remove_recipient(options.key_name())?;
        ensure_active(cancel)?;
        let object = self.store_envelope(options.object(), &head, &envelope).await?;
        info!("Removed key '{}' from {}", options.key_name(), options.object());
        Ok(object)
    }

    async fn load_envelope(&self, uri: &StoreUri) -> Result<(StoreObject, Envelope)> {
        let head = self.head_required(uri).await?;
        let envelope = Envelope::from_metadata(&head.user_metadata)?
            .ok_or(CryptoError::NotEncrypted)?;
        Ok((head, envelope))
    }

    async fn store_envelope(
        &self,
        uri: &StoreUri,
        head: &StoreObject,
        envelope: &Envelope,
    ) -> Result<StoreObject> {
        let mut user_metadata = head.user_metadata.clone();
        Envelope::clear_metadata(&mut user_metadata);
        envelope.write_metadata(&mut user_metadata);
        let metadata = ObjectMetadata::new().with_user_metadata(user_metadata);
        self.copy_one(uri, uri, Some(&metadata), false).await
    }
}
