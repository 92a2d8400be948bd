//! Chunked upload of files and directory trees

use crate::batch::run_bounded;
use crate::engine::{ensure_active, require_prefix_destination, resolve_destination, Engine};
use crate::error::{Error, Result};
use crate::metadata::TransferMetadata;
use crate::options::UploadOptions;
use crate::plan::{effective_chunk_size, Part, TransferPlan};
use crate::progress::{PartProgress, ProgressListener};
use crate::retry::{OperationKind, RetriableTask, RetryExecutor};
use bytes::Bytes;
use cloudstore_crypto::{generate_iv, ChainedCipher, ContentKey, CryptoError, Envelope, Iv};
use cloudstore_store::{CompletedPart, ObjectMetadata, ObjectStore, StoreObject, StoreUri};
use std::collections::HashMap;
use std::io::{BufReader, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Content key and envelope for an encrypted upload
struct Sealed {
    cipher: ChainedCipher,
    envelope: Envelope,
}

impl Engine {
    /// Upload one local file
    #[instrument(skip(self, options, cancel), fields(file = %options.file().display()))]
    pub async fn upload(
        self: &Arc<Self>,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<StoreObject>> {
        let file = options.file();
        let metadata = match tokio::fs::metadata(file).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::usage(format!(
                    "File '{}' does not exist",
                    file.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if metadata.is_dir() {
            return Err(Error::usage(format!(
                "'{}' is a directory, use a recursive upload",
                file.display()
            )));
        }
        let file_name = file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| Error::usage(format!("'{}' has no usable file name", file.display())))?;

        let destination = resolve_destination(options.destination(), file_name);
        self.require_bucket(&destination).await?;

        let sealed = match options.encryption_key() {
            Some(name) => Some(self.seal_for(name)?),
            None => None,
        };

        let size = metadata.len();
        let chunk_size = effective_chunk_size(
            options.chunk_size().or(self.config.chunk_size),
            size,
            self.store.min_part_size(),
            sealed.is_some(),
        );
        let plan = TransferPlan::new(
            destination.key(),
            size,
            chunk_size,
            self.store.supports_multipart(),
        );

        if options.dry_run() {
            info!(
                "<DRYRUN> Uploading '{}' to {} ({} bytes in {} parts)",
                file.display(),
                destination,
                size,
                plan.part_count()
            );
            return Ok(None);
        }

        let object = self
            .upload_file(options, &destination, plan, sealed, cancel)
            .await?;
        info!(
            "Uploaded '{}' to {} ({} bytes)",
            file.display(),
            destination,
            size
        );
        Ok(Some(object))
    }

    /// Upload every file under a local directory, keeping relative paths
    #[instrument(skip(self, options, cancel), fields(dir = %options.file().display()))]
    pub async fn upload_directory(
        self: &Arc<Self>,
        options: &UploadOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<StoreObject>>> {
        let root = options.file().to_path_buf();
        let is_dir = tokio::fs::metadata(&root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(Error::usage(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        let destination = options.destination();
        require_prefix_destination(destination)?;
        self.require_bucket(destination).await?;

        let files = tokio::task::spawn_blocking(move || walk_files(&root)).await??;
        let items: Vec<(PathBuf, StoreUri)> = files
            .into_iter()
            .map(|(path, relative)| (path, destination.join(&relative)))
            .collect();

        if options.dry_run() {
            for (path, target) in &items {
                info!("<DRYRUN> Uploading '{}' to {}", path.display(), target);
            }
            return Ok(None);
        }

        let template = options.clone().with_dry_run(false);
        let run = run_bounded(
            items,
            self.config.object_workers,
            cancel,
            false,
            |(path, target)| {
                let engine = Arc::clone(self);
                let options = template.for_file(path, target);
                let cancel = cancel.clone();
                async move {
                    let label = options.file().display().to_string();
                    let result = engine
                        .upload(&options, &cancel)
                        .await
                        .and_then(|object| object.ok_or(Error::Cancelled));
                    Ok((label, result))
                }
            },
        )
        .await;

        let objects = run.into_batch()?;
        info!("Uploaded {} files to {}", objects.len(), destination);
        Ok(Some(objects))
    }

    fn seal_for(&self, key_name: &str) -> Result<Sealed> {
        let public = self
            .keys
            .public_key(key_name)?
            .ok_or_else(|| CryptoError::MissingKey(key_name.to_string()))?;
        let content_key = ContentKey::generate();
        let envelope = Envelope::seal(&content_key, &[(key_name, &public)], generate_iv())?;
        Ok(Sealed {
            cipher: ChainedCipher::new(content_key),
            envelope,
        })
    }

    async fn upload_file(
        &self,
        options: &UploadOptions,
        destination: &StoreUri,
        plan: TransferPlan,
        sealed: Option<Sealed>,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let mut user_metadata = HashMap::new();
        TransferMetadata::new(plan.chunk_size(), plan.total_size()).write(&mut user_metadata);

        let (cipher, ivs) = match sealed {
            Some(Sealed { cipher, envelope }) => {
                envelope.write_metadata(&mut user_metadata);
                let ivs = if plan.is_multipart() {
                    part_ivs(&cipher, options.file(), envelope.iv_seed(), &plan).await?
                } else {
                    vec![*envelope.iv_seed()]
                };
                (Some(cipher), ivs)
            }
            None => (None, Vec::new()),
        };

        let metadata = ObjectMetadata::new()
            .with_user_metadata(user_metadata)
            .with_canned_acl(options.canned_acl().map(str::to_string));

        let job = Arc::new(UploadJob {
            store: Arc::clone(&self.store),
            executor: self.executor.clone(),
            file: options.file().to_path_buf(),
            destination: destination.clone(),
            plan,
            cipher,
            ivs,
            progress: options.progress().cloned(),
        });

        if job.plan.is_multipart() {
            job.upload_multipart(&metadata, self.config.part_workers, cancel)
                .await
        } else {
            job.upload_single(&metadata, cancel).await
        }
    }
}

/// The sequential encrypting pass that yields every part's IV
async fn part_ivs(
    cipher: &ChainedCipher,
    file: &Path,
    seed: &Iv,
    plan: &TransferPlan,
) -> Result<Vec<Iv>> {
    let cipher = cipher.clone();
    let path = file.to_path_buf();
    let seed = *seed;
    let chunk_size = plan.chunk_size();
    let part_count = plan.part_count();
    tokio::task::spawn_blocking(move || -> Result<Vec<Iv>> {
        let file = std::fs::File::open(&path)?;
        Ok(cipher.part_ivs(BufReader::new(file), &seed, chunk_size, part_count)?)
    })
    .await?
}

/// Regular files under `root` with their `/`-separated relative paths
fn walk_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let metadata = std::fs::metadata(&path)?;
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, relative));
            }
        }
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Everything a part task needs, shared across the tasks of one upload
struct UploadJob {
    store: Arc<dyn ObjectStore>,
    executor: RetryExecutor,
    file: PathBuf,
    destination: StoreUri,
    plan: TransferPlan,
    cipher: Option<ChainedCipher>,
    ivs: Vec<Iv>,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl UploadJob {
    fn task(&self) -> RetriableTask {
        RetriableTask::new(OperationKind::Upload, self.destination.to_string())
    }

    /// Read a part from disk, encrypting it when the upload is sealed
    async fn read_part(&self, part: &Part) -> Result<Bytes> {
        let length = usize::try_from(part.length)
            .map_err(|_| Error::usage(format!("Part of {} bytes is too large", part.length)))?;
        let mut buf = vec![0u8; length];
        if length > 0 {
            let mut file = tokio::fs::File::open(&self.file).await?;
            file.seek(SeekFrom::Start(part.offset)).await?;
            file.read_exact(&mut buf).await?;
        }

        match &self.cipher {
            Some(cipher) => {
                let iv = self.ivs.get(part.index).ok_or_else(|| {
                    CryptoError::Encryption(format!("no IV for part {}", part.part_number()))
                })?;
                let ciphertext = cipher.encrypt_part(iv, &buf, self.plan.is_last(part))?;
                Ok(Bytes::from(ciphertext))
            }
            None => Ok(Bytes::from(buf)),
        }
    }

    fn report(&self, part_id: String, part: &Part) {
        if let Some(listener) = &self.progress {
            listener.on_part_complete(&PartProgress {
                operation: OperationKind::Upload,
                object: self.destination.to_string(),
                part_id,
                bytes: part.length,
                total_bytes: self.plan.total_size(),
            });
        }
    }

    async fn upload_single(
        &self,
        metadata: &ObjectMetadata,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let part = self
            .plan
            .parts()
            .first()
            .copied()
            .ok_or_else(|| Error::usage("Transfer plan has no parts"))?;
        let (bucket, key) = (self.destination.bucket(), self.destination.key());

        ensure_active(cancel)?;
        let object = self
            .executor
            .execute(&self.task(), || async move {
                let data = self.read_part(&part).await?;
                self.store
                    .put_object(bucket, key, data, metadata)
                    .await
                    .map_err(Error::from)
            })
            .await?;
        self.report(format!("{}#1", self.destination), &part);
        Ok(object)
    }

    async fn upload_multipart(
        self: &Arc<Self>,
        metadata: &ObjectMetadata,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        ensure_active(cancel)?;
        let store = &self.store;
        let (bucket, key) = (self.destination.bucket(), self.destination.key());
        let upload_id = self
            .executor
            .execute(&self.task(), || async move {
                store
                    .initiate_multipart(bucket, key, metadata)
                    .await
                    .map_err(Error::from)
            })
            .await?;
        debug!(
            %upload_id,
            parts = self.plan.part_count(),
            chunk_size = self.plan.chunk_size(),
            "Initiated multipart upload"
        );

        match self.upload_parts(&upload_id, workers, cancel).await {
            Ok(object) => Ok(object),
            Err(e) => {
                self.abort(&upload_id).await;
                Err(e)
            }
        }
    }

    async fn upload_parts(
        self: &Arc<Self>,
        upload_id: &str,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<StoreObject> {
        let parts = self.plan.parts().to_vec();
        let run = run_bounded(parts, workers, cancel, true, |part| {
            let job = Arc::clone(self);
            let upload_id = upload_id.to_string();
            async move { job.upload_part(&upload_id, part).await }
        })
        .await;

        let mut completed = run.into_all()?;
        completed.sort_by_key(|p| p.part_number);

        let store = &self.store;
        let (bucket, key) = (self.destination.bucket(), self.destination.key());
        let completed = &completed;
        self.executor
            .execute(&self.task(), || async move {
                store
                    .complete_multipart(bucket, key, upload_id, completed)
                    .await
                    .map_err(Error::from)
            })
            .await
    }

    async fn upload_part(&self, upload_id: &str, part: Part) -> Result<CompletedPart> {
        let (bucket, key) = (self.destination.bucket(), self.destination.key());
        let completed = self
            .executor
            .execute(&self.task(), || async move {
                let data = self.read_part(&part).await?;
                self.store
                    .upload_part(bucket, key, upload_id, part.part_number(), data)
                    .await
                    .map_err(Error::from)
            })
            .await?;
        debug!(part = part.part_number(), bytes = part.length, "Uploaded part");
        self.report(format!("{}#{}", upload_id, part.part_number()), &part);
        Ok(completed)
    }

    async fn abort(&self, upload_id: &str) {
        let store = &self.store;
        let (bucket, key) = (self.destination.bucket(), self.destination.key());
        let task = self.task().ignore_abort_injection(true);
        let result = self
            .executor
            .execute(&task, || async move {
                store
                    .abort_multipart(bucket, key, upload_id)
                    .await
                    .map_err(Error::from)
            })
            .await;
        if let Err(e) = result {
            warn!(%upload_id, "Failed to abort multipart upload: {}", e);
        }
    }
}
