//! Chunked download of objects and prefixes

use crate::batch::run_bounded;
use crate::engine::{ensure_active, require_object_uri, Engine};
use crate::error::{Error, Result};
use crate::metadata::TransferMetadata;
use crate::options::DownloadOptions;
use crate::plan::{default_chunk_size, Part, TransferPlan};
use crate::progress::{PartProgress, ProgressListener};
use crate::retry::{OperationKind, RetriableTask, RetryExecutor};
use bytes::Bytes;
use cloudstore_crypto::cipher::validate_chunk_size;
use cloudstore_crypto::{ChainedCipher, Envelope, Iv, BLOCK_SIZE};
use cloudstore_store::{ObjectStore, StoreObject, StoreUri};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

fn invalid_data(message: String) -> Error {
    Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, message))
}

fn already_exists(path: &Path) -> Error {
    Error::usage(format!(
        "File '{}' already exists.  Please delete or use --overwrite",
        path.display()
    ))
}

/// An existing directory receives the object under its own name
async fn local_target(file: &Path, object_name: &str) -> PathBuf {
    match tokio::fs::metadata(file).await {
        Ok(metadata) if metadata.is_dir() => file.join(object_name),
        _ => file.to_path_buf(),
    }
}

/// Local path for a key below a prefix; `None` for keys that would escape
/// the target directory or name a directory placeholder
fn relative_path(root: &Path, relative_key: &str) -> Option<PathBuf> {
    if relative_key.is_empty() || relative_key.ends_with('/') {
        return None;
    }
    let relative = Path::new(relative_key);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

impl Engine {
    /// Download one object to a local file
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn download(
        self: &Arc<Self>,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreObject>> {
        let source = options.source();
        require_object_uri(source)?;

        let target = local_target(options.file(), source.file_name()).await;
        if !options.overwrite() && tokio::fs::try_exists(&target).await? {
            return Err(already_exists(&target));
        }

        let object = self.head_required(source).await?;
        let layout = TransferMetadata::read(&object.user_metadata)?;
        let cipher = match Envelope::from_metadata(&object.user_metadata)? {
            Some(envelope) => Some((
                ChainedCipher::new(envelope.unwrap(&*self.keys)?),
                *envelope.iv_seed(),
            )),
            None => None,
        };

        let (chunk_size, expected_len) = match layout {
            Some(layout) => (layout.chunk_size, layout.file_length),
            None if cipher.is_some() => {
                return Err(Error::usage(format!(
                    "Encrypted object {} has no chunk-size metadata",
                    source
                )));
            }
            None => (default_chunk_size(object.size), object.size),
        };
        if cipher.is_some() {
            validate_chunk_size(chunk_size)?;
        }

        let plan = TransferPlan::new(source.key(), object.size, chunk_size, true);
        if options.dry_run() {
            info!(
                "<DRYRUN> Downloading {} to '{}' ({} bytes in {} parts)",
                source,
                target.display(),
                object.size,
                plan.part_count()
            );
            return Ok(None);
        }

        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ensure_active(cancel)?;
        tokio::fs::create_dir_all(&parent).await?;
        let temp = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".cloudstore-")
                .suffix(".partial")
                .tempfile_in(&parent)
        })
        .await??;

        let job = Arc::new(DownloadJob {
            store: Arc::clone(&self.store),
            executor: self.executor.clone(),
            source: source.clone(),
            plan,
            cipher,
            temp_path: temp.path().to_path_buf(),
            progress: options.progress().cloned(),
        });

        let parts = job.plan.parts().to_vec();
        run_bounded(parts, self.config.part_workers, cancel, true, |part| {
            let job = Arc::clone(&job);
            async move { job.fetch_part(part).await }
        })
        .await
        .into_all()?;

        let written = tokio::fs::metadata(temp.path()).await?.len();
        if written != expected_len {
            return Err(invalid_data(format!(
                "Downloaded {} bytes of {}, expected {}",
                written, source, expected_len
            )));
        }

        let persisted = if options.overwrite() {
            temp.persist(&target)
        } else {
            temp.persist_noclobber(&target)
        };
        if let Err(e) = persisted {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(already_exists(&target));
            }
            return Err(e.error.into());
        }

        info!("Downloaded {} to '{}' ({} bytes)", source, target.display(), written);
        Ok(Some(object))
    }

    /// Download every object under a prefix into a local directory
    #[instrument(skip(self, options, cancel), fields(source = %options.source()))]
    pub async fn download_directory(
        self: &Arc<Self>,
        options: &DownloadOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<StoreObject>>> {
        let source = options.source();
        if !source.is_prefix() {
            return Err(Error::usage(format!(
                "Source directory key should end with a '/': {}",
                source
            )));
        }
        let root = options.file();
        if let Ok(metadata) = tokio::fs::metadata(root).await {
            if !metadata.is_dir() {
                return Err(Error::usage(format!(
                    "'{}' exists and is not a directory",
                    root.display()
                )));
            }
        }
        self.require_bucket(source).await?;

        let mut items = Vec::new();
        for object in self.list(source, true).await? {
            let relative_key = &object.key[source.key().len()..];
            match relative_path(root, relative_key) {
                Some(path) => items.push((source.with_key(object.key.clone()), path)),
                None => warn!(key = %object.key, "Skipping key with no local file name"),
            }
        }
        if !options.overwrite() {
            for (_, path) in &items {
                if tokio::fs::try_exists(path).await? {
                    return Err(already_exists(path));
                }
            }
        }

        if options.dry_run() {
            for (uri, path) in &items {
                info!("<DRYRUN> Downloading {} to '{}'", uri, path.display());
            }
            return Ok(None);
        }

        ensure_active(cancel)?;
        tokio::fs::create_dir_all(root).await?;
        let template = options.clone().with_dry_run(false);
        let run = run_bounded(
            items,
            self.config.object_workers,
            cancel,
            false,
            |(uri, path)| {
                let engine = Arc::clone(self);
                let options = template.for_object(uri, path);
                let cancel = cancel.clone();
                async move {
                    let label = options.source().to_string();
                    let result = engine
                        .download(&options, &cancel)
                        .await
                        .and_then(|object| object.ok_or(Error::Cancelled));
                    Ok((label, result))
                }
            },
        )
        .await;

        let objects = run.into_batch()?;
        info!("Downloaded {} objects from {}", objects.len(), source);
        Ok(Some(objects))
    }
}

/// Shared state of the part tasks of one download
struct DownloadJob {
    store: Arc<dyn ObjectStore>,
    executor: RetryExecutor,
    source: StoreUri,
    plan: TransferPlan,
    cipher: Option<(ChainedCipher, Iv)>,
    temp_path: PathBuf,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl DownloadJob {
    /// Fetch one part, decrypt it if needed and write it at its plaintext offset.
    ///
    /// Encrypted parts after the first are fetched one block early: that
    /// block is the previous part's last ciphertext block, i.e. this part's IV.
    async fn fetch_part(&self, part: Part) -> Result<()> {
        if part.length == 0 {
            return Ok(());
        }
        let lead = match self.cipher {
            Some(_) if part.index > 0 => BLOCK_SIZE as u64,
            _ => 0,
        };
        let range = part.offset - lead..part.end();

        let task = RetriableTask::new(OperationKind::Download, self.source.to_string());
        let store = &self.store;
        let (bucket, key) = (self.source.bucket(), self.source.key());
        let data = self
            .executor
            .execute(&task, || {
                let range = range.clone();
                async move {
                    store
                        .get_range(bucket, key, range)
                        .await
                        .map_err(Error::from)
                }
            })
            .await?;
        if data.len() as u64 != range.end - range.start {
            return Err(invalid_data(format!(
                "Short read of part {} of {}: {} bytes",
                part.part_number(),
                self.source,
                data.len()
            )));
        }

        let plaintext = match &self.cipher {
            Some((cipher, seed)) => {
                let (iv, body) = if part.index == 0 {
                    (*seed, &data[..])
                } else {
                    let mut iv = [0u8; BLOCK_SIZE];
                    iv.copy_from_slice(&data[..BLOCK_SIZE]);
                    (iv, &data[BLOCK_SIZE..])
                };
                Bytes::from(cipher.decrypt_part(&iv, body, self.plan.is_last(&part))?)
            }
            None => data,
        };

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.temp_path)
            .await?;
        file.seek(SeekFrom::Start(part.offset)).await?;
        file.write_all(&plaintext).await?;
        file.flush().await?;

        debug!(part = part.part_number(), bytes = plaintext.len(), "Downloaded part");
        if let Some(listener) = &self.progress {
            listener.on_part_complete(&PartProgress {
                operation: OperationKind::Download,
                object: self.source.to_string(),
                part_id: format!("{}#{}", self.source, part.part_number()),
                bytes: plaintext.len() as u64,
                total_bytes: self.plan.total_size(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_rejects_escapes() {
        let root = Path::new("/tmp/out");
        assert_eq!(
            relative_path(root, "a/b.txt"),
            Some(PathBuf::from("/tmp/out/a/b.txt"))
        );
        assert_eq!(relative_path(root, "../etc/passwd"), None);
        assert_eq!(relative_path(root, "/abs"), None);
        assert_eq!(relative_path(root, "dir/"), None);
        assert_eq!(relative_path(root, ""), None);
    }

    #[tokio::test]
    async fn test_local_target_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(local_target(dir.path(), "obj").await, dir.path().join("obj"));

        let file = dir.path().join("named");
        assert_eq!(local_target(&file, "obj").await, file);
    }
}
