//! Copy-then-delete rename of objects and prefixes

use crate::batch::run_bounded;
use crate::copy::{acl_metadata, expand};
use crate::engine::{
    ensure_active, require_object_uri, require_prefix_destination, resolve_destination, Engine,
};
use crate::error::{Error, Result};
use crate::options::RenameOptions;
use cloudstore_store::{StoreObject, StoreUri};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

fn cannot_overwrite(destination: &StoreUri) -> Error {
    Error::usage(format!(
        "Cannot overwrite existing destination object '{}'",
        destination
    ))
}

fn same_object(a: &StoreUri, b: &StoreUri) -> bool {
    a.bucket() == b.bucket() && a.key() == b.key()
}

impl Engine {
    /// Rename one object
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn rename(
        self: &Arc<Self>,
        options: &RenameOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreObject>> {
        let source = options.source();
        require_object_uri(source)?;
        let destination = resolve_destination(options.destination(), source.file_name());
        if same_object(source, &destination) {
            return Err(cannot_overwrite(&destination));
        }

        let head = self.head(source).await?.ok_or_else(|| {
            Error::usage(format!("Source object '{}' does not exist", source))
        })?;
        self.require_bucket(&destination).await?;
        let existed = self.exists(&destination).await?;
        if existed && !options.overwrite() {
            return Err(cannot_overwrite(&destination));
        }

        if options.dry_run() {
            info!("<DRYRUN> Renaming {} to {}", source, destination);
            return Ok(None);
        }

        let object = self
            .move_object(&head, source, &destination, existed, options.canned_acl(), cancel)
            .await?;
        info!("Renamed {} to {}", source, destination);
        Ok(Some(object))
    }

    /// Rename every object under a prefix
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn rename_recursively(
        self: &Arc<Self>,
        options: &RenameOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<StoreObject>>> {
        let source = options.source();
        let destination = options.destination();
        require_prefix_destination(destination)?;
        if same_object(source, destination) {
            return Err(cannot_overwrite(destination));
        }
        self.require_bucket(source).await?;
        self.require_bucket(destination).await?;

        // A plain object where the destination directory would go
        let plain = destination.with_key(destination.key().trim_end_matches('/'));
        if !plain.key().is_empty() && self.exists(&plain).await? {
            return Err(cannot_overwrite(&plain));
        }

        let items = expand(self.list(source, true).await?, source, destination);
        if options.dry_run() {
            for (from, to) in &items {
                info!("<DRYRUN> Renaming {} to {}", from, to);
            }
            return Ok(None);
        }

        let overwrite = options.overwrite();
        let acl = options.canned_acl().map(str::to_string);
        let run = run_bounded(
            items,
            self.config.object_workers,
            cancel,
            false,
            |(from, to)| {
                let engine = Arc::clone(self);
                let acl = acl.clone();
                let cancel = cancel.clone();
                async move {
                    let result = engine
                        .rename_listed(&from, &to, overwrite, acl.as_deref(), &cancel)
                        .await;
                    Ok((from.to_string(), result))
                }
            },
        )
        .await;

        let objects = run.into_batch()?;
        info!("Renamed {} objects from {} to {}", objects.len(), source, destination);
        Ok(Some(objects))
    }

    async fn rename_listed(
        &self,
        source: &StoreUri,
        destination: &StoreUri,
        overwrite: bool,
        acl: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let head = self.head_required(source).await?;
        let existed = self.exists(destination).await?;
        if existed && !overwrite {
            return Err(cannot_overwrite(destination));
        }
        self.move_object(&head, source, destination, existed, acl, cancel)
            .await
    }

    /// Copy, then delete the source.
    ///
    /// A failed copy removes a destination it may have created, unless that
    /// destination existed before. A failed delete leaves both objects and
    /// reports [`Error::RenameIncomplete`]. Cancellation after the copy also
    /// leaves both objects in place.
    async fn move_object(
        &self,
        head: &StoreObject,
        source: &StoreUri,
        destination: &StoreUri,
        destination_existed: bool,
        acl: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        ensure_active(cancel)?;
        let metadata = acl_metadata(head, acl);
        let copied = match self
            .copy_one(source, destination, metadata.as_ref(), false)
            .await
        {
            Ok(object) => object,
            Err(e) => {
                if !destination_existed {
                    self.discard_partial_copy(destination).await;
                }
                return Err(e);
            }
        };

        if let Err(e) = ensure_active(cancel) {
            warn!(%source, %destination, "Rename cancelled after the copy; source was kept");
            return Err(e);
        }
        if let Err(e) = self.delete_one(source, false).await {
            warn!(%source, %destination, "Rename copied the object but could not delete the source: {}", e);
            return Err(Error::RenameIncomplete {
                from: source.to_string(),
                to: destination.to_string(),
                cause: Box::new(e),
            });
        }
        Ok(copied)
    }

    async fn discard_partial_copy(&self, destination: &StoreUri) {
        let outcome = match self.exists(destination).await {
            Ok(true) => self.delete_one(destination, true).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!(%destination, "Failed to clean up after a failed rename: {}", e);
        }
    }
}
