//! Deletion of objects and prefixes

use crate::batch::run_bounded;
use crate::engine::{ensure_active, require_object_uri, Engine};
use crate::error::{Error, Result};
use crate::options::DeleteOptions;
use cloudstore_store::StoreObject;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

impl Engine {
    /// Delete one object, returning its last snapshot
    #[instrument(skip(self, options, cancel), fields(target = %options.target()))]
    pub async fn delete(
        self: &Arc<Self>,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreObject>> {
        let target = options.target();
        require_object_uri(target)?;

        let head = self
            .head(target)
            .await?
            .ok_or_else(|| Error::usage(format!("Object '{}' does not exist", target)))?;

        if options.dry_run() {
            info!("<DRYRUN> Deleting {}", target);
            return Ok(None);
        }

        ensure_active(cancel)?;
        self.delete_one(target, options.ignore_abort_injection())
            .await?;
        info!("Deleted {}", target);
        Ok(Some(head))
    }

    /// Delete every object under a prefix
    #[instrument(skip(self, options, cancel), fields(target = %options.target()))]
    pub async fn delete_recursively(
        self: &Arc<Self>,
        options: &DeleteOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<StoreObject>>> {
        let target = options.target();
        self.require_bucket(target).await?;
        let objects: Vec<StoreObject> = self
            .list(target, true)
            .await?
            .into_iter()
            .filter(|object| !object.key.ends_with('/'))
            .collect();

        if options.dry_run() {
            for object in &objects {
                info!("<DRYRUN> Deleting {}", target.with_key(object.key.clone()));
            }
            return Ok(None);
        }

        let ignore = options.ignore_abort_injection();
        let run = run_bounded(
            objects,
            self.config.object_workers,
            cancel,
            false,
            |object| {
                let engine = Arc::clone(self);
                let uri = target.with_key(object.key.clone());
                async move {
                    let result = engine.delete_one(&uri, ignore).await.map(|()| object);
                    Ok((uri.to_string(), result))
                }
            },
        )
        .await;

        let deleted = run.into_batch()?;
        info!("Deleted {} objects under {}", deleted.len(), target);
        Ok(Some(deleted))
    }
}
