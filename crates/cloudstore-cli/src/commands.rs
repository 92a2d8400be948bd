//! Subcommands

use crate::progress::ConsoleProgress;
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Subcommand;
use cloudstore_core::{
    CloudStoreClient, CopyOptions, DeleteOptions, DownloadOptions, EncryptionKeyOptions,
    EngineConfig, OperationHandle, PendingUploadsOptions, RenameOptions, UploadOptions,
};
use cloudstore_crypto::keys::validate_key_name;
use cloudstore_crypto::{KeyPair, DEFAULT_RSA_BITS};
use cloudstore_store::{PendingUpload, StoreObject, StoreUri};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file, or a directory tree with --recursive
    Upload {
        /// Local file or directory
        file: PathBuf,
        /// Destination, e.g. s3://bucket/key or s3://bucket/prefix/
        destination: String,
        #[arg(short, long)]
        recursive: bool,
        /// Encrypt for this key
        #[arg(long)]
        key: Option<String>,
        /// Part size in bytes
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Canned ACL, passed through to the store
        #[arg(long)]
        acl: Option<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_progress: bool,
    },

    /// Download an object, or every object under a prefix with --recursive
    Download {
        source: String,
        /// Local file or directory
        file: PathBuf,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long)]
        overwrite: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        no_progress: bool,
    },

    /// Copy objects within the store
    Cp {
        source: String,
        destination: String,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long)]
        acl: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename (copy, then delete) objects
    Mv {
        source: String,
        destination: String,
        #[arg(short, long)]
        recursive: bool,
        /// Fail instead of replacing an existing destination
        #[arg(long)]
        no_overwrite: bool,
        #[arg(long)]
        acl: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete objects
    Rm {
        target: String,
        #[arg(short, long)]
        recursive: bool,
        #[arg(long)]
        dry_run: bool,
    },

    /// List objects under a prefix
    Ls {
        uri: String,
        #[arg(short, long)]
        recursive: bool,
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Exit with status 0 if the object exists, 1 otherwise
    Exists { uri: String },

    /// Grant a key access to an encrypted object
    AddKey { object: String, key: String },

    /// Revoke a key's access to an encrypted object
    RemoveKey { object: String, key: String },

    /// List multipart uploads left open under a prefix
    ListPendingUploads {
        uri: String,
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Abort pending multipart uploads by id and/or age
    AbortPendingUploads {
        /// Object key, or a prefix when only --older-than is given
        uri: String,
        /// Id of the upload to abort
        #[arg(long)]
        id: Option<String>,
        /// Abort uploads initiated before this UTC time:
        /// "2015-02-20", "2015-02-20 19:31:51" or RFC 3339
        #[arg(long, value_parser = parse_cutoff)]
        older_than: Option<DateTime<Utc>>,
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a key pair into the first key directory
    Keygen {
        name: String,
        #[arg(long, default_value_t = DEFAULT_RSA_BITS)]
        bits: usize,
    },
}

fn uri(text: &str) -> anyhow::Result<StoreUri> {
    StoreUri::parse(text).with_context(|| format!("invalid store URI '{}'", text))
}

/// Await an operation, cancelling it on Ctrl-C
async fn wait<T>(mut handle: OperationHandle<T>) -> cloudstore_core::Result<T> {
    tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling");
            handle.cancel();
            handle.await
        }
    }
}

/// A UTC cutoff given as a date, a date and time, or RFC 3339
fn parse_cutoff(text: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Ok(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
        .ok_or_else(|| format!("'{}' is not a date like 2015-02-20 or 2015-02-20 19:31:51", text))
}

fn print_upload(upload: &PendingUpload) {
    println!(
        "{}/{}  {}  {}",
        upload.bucket,
        upload.key,
        upload.upload_id,
        upload.initiated.format("%Y-%m-%d %H:%M:%S")
    );
}

fn print_object(object: &StoreObject) {
    println!(
        "{:>12}  {}  {}/{}",
        object.size,
        object.last_modified.format("%Y-%m-%d %H:%M:%S"),
        object.bucket,
        object.key
    );
}

fn report_one(verb: &str, result: Option<StoreObject>) {
    match result {
        Some(object) => println!("{} {}/{}", verb, object.bucket, object.key),
        None => println!("(dry run, nothing changed)"),
    }
}

fn report_many(verb: &str, result: Option<Vec<StoreObject>>) {
    match result {
        Some(objects) => {
            for object in &objects {
                println!("{} {}/{}", verb, object.bucket, object.key);
            }
            println!("{} {} objects", verb, objects.len());
        }
        None => println!("(dry run, nothing changed)"),
    }
}

pub async fn run(client: &CloudStoreClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Upload {
            file,
            destination,
            recursive,
            key,
            chunk_size,
            acl,
            dry_run,
            no_progress,
        } => {
            let mut options = UploadOptions::new(file, uri(&destination)?).with_dry_run(dry_run);
            if let Some(size) = chunk_size {
                options = options.with_chunk_size(size)?;
            }
            if let Some(key) = key {
                options = options.with_encryption_key(key)?;
            }
            if let Some(acl) = acl {
                options = options.with_canned_acl(acl);
            }
            if !no_progress {
                options = options.with_progress(Arc::new(ConsoleProgress::new()));
            }
            if recursive {
                report_many("uploaded", wait(client.upload_directory(options)).await?);
            } else {
                report_one("uploaded", wait(client.upload(options)).await?);
            }
        }

        Command::Download {
            source,
            file,
            recursive,
            overwrite,
            dry_run,
            no_progress,
        } => {
            let mut options = DownloadOptions::new(uri(&source)?, file)
                .with_overwrite(overwrite)
                .with_dry_run(dry_run);
            if !no_progress {
                options = options.with_progress(Arc::new(ConsoleProgress::new()));
            }
            if recursive {
                report_many("downloaded", wait(client.download_directory(options)).await?);
            } else {
                report_one("downloaded", wait(client.download(options)).await?);
            }
        }

        Command::Cp {
            source,
            destination,
            recursive,
            acl,
            dry_run,
        } => {
            let mut options =
                CopyOptions::new(uri(&source)?, uri(&destination)?).with_dry_run(dry_run);
            if let Some(acl) = acl {
                options = options.with_canned_acl(acl);
            }
            if recursive {
                report_many("copied", wait(client.copy_recursively(options)).await?);
            } else {
                report_one("copied", wait(client.copy(options)).await?);
            }
        }

        Command::Mv {
            source,
            destination,
            recursive,
            no_overwrite,
            acl,
            dry_run,
        } => {
            let mut options = RenameOptions::new(uri(&source)?, uri(&destination)?)
                .with_overwrite(!no_overwrite)
                .with_dry_run(dry_run);
            if let Some(acl) = acl {
                options = options.with_canned_acl(acl);
            }
            if recursive {
                report_many("renamed", wait(client.rename_recursively(options)).await?);
            } else {
                report_one("renamed", wait(client.rename(options)).await?);
            }
        }

        Command::Rm {
            target,
            recursive,
            dry_run,
        } => {
            let options = DeleteOptions::new(uri(&target)?).with_dry_run(dry_run);
            if recursive {
                report_many("deleted", wait(client.delete_recursively(options)).await?);
            } else {
                report_one("deleted", wait(client.delete(options)).await?);
            }
        }

        Command::Ls {
            uri: text,
            recursive,
            json,
        } => {
            for object in wait(client.list(uri(&text)?, recursive)).await? {
                if json {
                    println!("{}", serde_json::to_string(&object)?);
                } else {
                    print_object(&object);
                }
            }
        }

        Command::Exists { uri: text } => {
            if !wait(client.exists(uri(&text)?)).await? {
                println!("{} does not exist", text);
                std::process::exit(1);
            }
            println!("{} exists", text);
        }

        Command::AddKey { object, key } => {
            let options = EncryptionKeyOptions::new(uri(&object)?, key.as_str())?;
            wait(client.add_encryption_key(options)).await?;
            println!("Added key '{}' to {}", key, object);
        }

        Command::RemoveKey { object, key } => {
            let options = EncryptionKeyOptions::new(uri(&object)?, key.as_str())?;
            wait(client.remove_encryption_key(options)).await?;
            println!("Removed key '{}' from {}", key, object);
        }

        Command::ListPendingUploads { uri: text, json } => {
            let mut uploads = wait(client.list_pending_uploads(uri(&text)?)).await?;
            uploads.sort_by(|a, b| a.initiated.cmp(&b.initiated));
            for upload in &uploads {
                if json {
                    println!("{}", serde_json::to_string(upload)?);
                } else {
                    print_upload(upload);
                }
            }
        }

        Command::AbortPendingUploads {
            uri: text,
            id,
            older_than,
            dry_run,
        } => {
            if id.is_none() && older_than.is_none() {
                bail!("at least one of --id or --older-than is required");
            }
            let mut options = PendingUploadsOptions::new(uri(&text)?).with_dry_run(dry_run);
            if let Some(id) = id {
                options = options.with_upload_id(id);
            }
            if let Some(cutoff) = older_than {
                options = options.with_older_than(cutoff);
            }
            match wait(client.abort_pending_uploads(options)).await? {
                Some(aborted) => {
                    for upload in &aborted {
                        println!("aborted {}", upload.upload_id);
                    }
                    println!("aborted {} pending uploads", aborted.len());
                }
                None => println!("(dry run, nothing changed)"),
            }
        }

        Command::Keygen { .. } => bail!("keygen does not use a store"),
    }
    Ok(())
}

/// Generate an RSA key pair and store it as `<name>.pem` in the first key directory
pub fn keygen(config: &EngineConfig, name: &str, bits: usize) -> anyhow::Result<()> {
    validate_key_name(name)?;
    let dir = config
        .key_dirs
        .first()
        .context("no key directory configured")?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create key directory {}", dir.display()))?;

    let pair = KeyPair::generate(bits)?;
    let path = pair.write_key_file(dir, name)?;
    println!(
        "Wrote key '{}' to {} (hash {})",
        name,
        path.display(),
        pair.pubkey_hash()?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cutoff_formats() {
        let day = parse_cutoff("2015-02-20").unwrap();
        assert_eq!(day.to_rfc3339(), "2015-02-20T00:00:00+00:00");

        let time = parse_cutoff("2015-02-20 19:31:51").unwrap();
        assert_eq!(time.to_rfc3339(), "2015-02-20T19:31:51+00:00");

        let offset = parse_cutoff("2015-02-20T21:31:51+02:00").unwrap();
        assert_eq!(offset, time);

        assert!(parse_cutoff("20/02/2015").is_err());
    }
}
