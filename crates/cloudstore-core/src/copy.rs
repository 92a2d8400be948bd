//! Server-side copy of objects and prefixes

use crate::batch::run_bounded;
use crate::engine::{
    ensure_active, require_object_uri, require_prefix_destination, resolve_destination, Engine,
};
use crate::error::Result;
use crate::options::CopyOptions;
use cloudstore_store::{ObjectMetadata, StoreObject, StoreUri};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Pair every object under `source` with its key under `destination`,
/// keeping the path relative to the source's parent prefix
pub(crate) fn expand(
    objects: Vec<StoreObject>,
    source: &StoreUri,
    destination: &StoreUri,
) -> Vec<(StoreUri, StoreUri)> {
    let base = source.parent_prefix();
    objects
        .into_iter()
        .filter(|object| !object.key.ends_with('/'))
        .map(|object| {
            let target = destination.join(&object.key[base.len()..]);
            (source.with_key(object.key), target)
        })
        .collect()
}

/// Metadata replacement carrying a canned ACL, keeping the source metadata
pub(crate) fn acl_metadata(source: &StoreObject, acl: Option<&str>) -> Option<ObjectMetadata> {
    acl.map(|acl| {
        ObjectMetadata::new()
            .with_user_metadata(source.user_metadata.clone())
            .with_canned_acl(Some(acl.to_string()))
    })
}

impl Engine {
    /// Copy one object
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn copy(
        self: &Arc<Self>,
        options: &CopyOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreObject>> {
        let source = options.source();
        require_object_uri(source)?;
        let destination = resolve_destination(options.destination(), source.file_name());

        let head = self.head_required(source).await?;
        self.require_bucket(&destination).await?;

        if options.dry_run() {
            info!("<DRYRUN> Copying {} to {}", source, destination);
            return Ok(None);
        }

        ensure_active(cancel)?;
        let metadata = acl_metadata(&head, options.canned_acl());
        let object = self
            .copy_one(
                source,
                &destination,
                metadata.as_ref(),
                options.ignore_abort_injection(),
            )
            .await?;
        info!("Copied {} to {}", source, destination);
        Ok(Some(object))
    }

    /// Copy every object under a prefix
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn copy_recursively(
        self: &Arc<Self>,
        options: &CopyOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<StoreObject>>> {
        let source = options.source();
        let destination = options.destination();
        require_prefix_destination(destination)?;
        self.require_bucket(source).await?;
        self.require_bucket(destination).await?;

        let items = expand(self.list(source, true).await?, source, destination);
        if options.dry_run() {
            for (from, to) in &items {
                info!("<DRYRUN> Copying {} to {}", from, to);
            }
            return Ok(None);
        }

        let acl = options.canned_acl().map(str::to_string);
        let ignore = options.ignore_abort_injection();
        let run = run_bounded(
            items,
            self.config.object_workers,
            cancel,
            false,
            |(from, to)| {
                let engine = Arc::clone(self);
                let acl = acl.clone();
                async move {
                    let result = engine.copy_listed(&from, &to, acl.as_deref(), ignore).await;
                    Ok((from.to_string(), result))
                }
            },
        )
        .await;

        let objects = run.into_batch()?;
        info!("Copied {} objects from {} to {}", objects.len(), source, destination);
        Ok(Some(objects))
    }

    /// Copy an object found by a listing. Listings carry no user metadata,
    /// so a canned ACL needs a head first.
    pub(crate) async fn copy_listed(
        &self,
        source: &StoreUri,
        destination: &StoreUri,
        acl: Option<&str>,
        ignore_abort_injection: bool,
    ) -> Result<StoreObject> {
        let metadata = match acl {
            Some(_) => acl_metadata(&self.head_required(source).await?, acl),
            None => None,
        };
        self.copy_one(source, destination, metadata.as_ref(), ignore_abort_injection)
            .await
    }
}
