//! Listing and aborting multipart uploads left open by interrupted transfers

use crate::batch::run_bounded;
use crate::engine::{bucket_usage, ensure_active, Engine};
use crate::error::{Error, Result};
use crate::options::PendingUploadsOptions;
use crate::retry::{OperationKind, RetriableTask};
use cloudstore_store::{PendingUpload, StoreUri};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Uploads picked by the id and cutoff filters
fn select(
    uploads: Vec<PendingUpload>,
    options: &PendingUploadsOptions,
) -> Result<Vec<PendingUpload>> {
    let selected: Vec<PendingUpload> = uploads
        .into_iter()
        .filter(|upload| options.upload_id().map_or(true, |id| upload.upload_id == id))
        .filter(|upload| options.older_than().map_or(true, |cutoff| upload.initiated < cutoff))
        .collect();

    if let Some(id) = options.upload_id() {
        if selected.is_empty() && options.older_than().is_none() {
            return Err(Error::usage(format!(
                "No pending upload with id '{}' under {}",
                id,
                options.target()
            )));
        }
    }
    Ok(selected)
}

impl Engine {
    /// Open multipart uploads whose key starts with the target's key
    #[instrument(skip(self, target), fields(target = %target))]
    pub async fn list_pending_uploads(&self, target: &StoreUri) -> Result<Vec<PendingUpload>> {
        self.require_bucket(target).await?;
        let task = RetriableTask::new(OperationKind::Metadata, target.to_string());
        let store = &self.store;
        self.executor
            .execute(&task, || async move {
                store
                    .list_pending_uploads(target.bucket(), target.key())
                    .await
                    .map_err(Error::from)
            })
            .await
            .map_err(bucket_usage)
    }

    /// Abort the pending uploads picked by the options, returning them
    #[instrument(skip(self, options, cancel), fields(target = %options.target()))]
    pub async fn abort_pending_uploads(
        self: &Arc<Self>,
        options: &PendingUploadsOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<PendingUpload>>> {
        if options.upload_id().is_none() && options.older_than().is_none() {
            return Err(Error::usage(
                "At least one of an upload id or a cutoff time should be given",
            ));
        }

        let uploads = select(self.list_pending_uploads(options.target()).await?, options)?;
        if options.dry_run() {
            for upload in &uploads {
                let uri = options.target().with_key(upload.key.clone());
                info!("<DRYRUN> Aborting upload {} of {}", upload.upload_id, uri);
            }
            return Ok(None);
        }

        let run = run_bounded(
            uploads,
            self.config.object_workers,
            cancel,
            false,
            |upload| {
                let engine = Arc::clone(self);
                let cancel = cancel.clone();
                async move {
                    ensure_active(&cancel)?;
                    engine.abort_upload(&upload).await?;
                    Ok(upload)
                }
            },
        )
        .await;

        let aborted = run.into_all()?;
        info!("Aborted {} pending uploads under {}", aborted.len(), options.target());
        Ok(Some(aborted))
    }

    async fn abort_upload(&self, upload: &PendingUpload) -> Result<()> {
        let task = RetriableTask::new(OperationKind::Upload, upload.upload_id.clone());
        let store = &self.store;
        self.executor
            .execute(&task, || async move {
                store
                    .abort_multipart(&upload.bucket, &upload.key, &upload.upload_id)
                    .await
                    .map_err(Error::from)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn upload(key: &str, id: &str, age_hours: i64) -> PendingUpload {
        PendingUpload {
            bucket: "b".to_string(),
            key: key.to_string(),
            upload_id: id.to_string(),
            initiated: Utc::now() - Duration::hours(age_hours),
        }
    }

    fn options() -> PendingUploadsOptions {
        PendingUploadsOptions::new(StoreUri::parse("s3://b/tmp/").unwrap())
    }

    #[test]
    fn test_select_by_id_and_age() {
        let uploads = vec![upload("tmp/a", "u1", 48), upload("tmp/b", "u2", 1)];

        let cutoff = Utc::now() - Duration::hours(24);
        let by_age = select(uploads.clone(), &options().with_older_than(cutoff)).unwrap();
        assert_eq!(by_age, vec![uploads[0].clone()]);

        let by_id = select(uploads.clone(), &options().with_upload_id("u2")).unwrap();
        assert_eq!(by_id, vec![uploads[1].clone()]);

        // Known id that is too recent is simply not selected
        let both = options().with_upload_id("u2").with_older_than(cutoff);
        assert!(select(uploads.clone(), &both).unwrap().is_empty());

        let err = select(uploads, &options().with_upload_id("missing")).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
