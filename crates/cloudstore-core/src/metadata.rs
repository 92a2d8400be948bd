//! Transfer metadata stored with every object the engine uploads

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Chunk size the object was uploaded with
pub const META_CHUNK_SIZE: &str = "chunk-size";
/// Plaintext length of the object
pub const META_FILE_LENGTH: &str = "file-length";
/// Layout version of the stored object
pub const META_FORMAT_VERSION: &str = "format-version";

/// Version written by this engine
pub const FORMAT_VERSION: u32 = 1;

/// Layout parameters needed to download an object the engine wrote
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferMetadata {
    pub chunk_size: u64,
    pub file_length: u64,
    pub format_version: u32,
}

impl TransferMetadata {
    pub fn new(chunk_size: u64, file_length: u64) -> Self {
        Self {
            chunk_size,
            file_length,
            format_version: FORMAT_VERSION,
        }
    }

    pub fn write(&self, metadata: &mut HashMap<String, String>) {
        metadata.insert(META_CHUNK_SIZE.to_string(), self.chunk_size.to_string());
        metadata.insert(META_FILE_LENGTH.to_string(), self.file_length.to_string());
        metadata.insert(
            META_FORMAT_VERSION.to_string(),
            self.format_version.to_string(),
        );
    }

    /// Read transfer metadata. Objects written by other tools carry none and
    /// yield `None`; a newer format version is rejected.
    pub fn read(metadata: &HashMap<String, String>) -> Result<Option<Self>> {
        let Some(chunk_size) = metadata.get(META_CHUNK_SIZE) else {
            return Ok(None);
        };
        let chunk_size = parse_number(META_CHUNK_SIZE, chunk_size)?;
        if chunk_size == 0 {
            return Err(Error::usage("Object metadata has a zero chunk-size"));
        }
        let file_length = match metadata.get(META_FILE_LENGTH) {
            Some(value) => parse_number(META_FILE_LENGTH, value)?,
            None => return Err(Error::usage("Object metadata is missing file-length")),
        };
        let format_version = match metadata.get(META_FORMAT_VERSION) {
            Some(value) => u32::try_from(parse_number(META_FORMAT_VERSION, value)?)
                .map_err(|_| Error::usage("Object format-version is out of range"))?,
            None => FORMAT_VERSION,
        };
        if format_version > FORMAT_VERSION {
            return Err(Error::usage(format!(
                "Object was written with format version {}, this client supports up to {}",
                format_version, FORMAT_VERSION
            )));
        }

        Ok(Some(Self {
            chunk_size,
            file_length,
            format_version,
        }))
    }
}

fn parse_number(field: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::usage(format!("Invalid {} in object metadata: '{}'", field, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut map = HashMap::new();
        TransferMetadata::new(5 << 20, 12345).write(&mut map);
        assert_eq!(map.get("chunk-size").unwrap(), "5242880");
        assert_eq!(map.get("format-version").unwrap(), "1");

        let read = TransferMetadata::read(&map).unwrap().unwrap();
        assert_eq!(read.chunk_size, 5 << 20);
        assert_eq!(read.file_length, 12345);
    }

    #[test]
    fn test_foreign_object_has_no_metadata() {
        let map = HashMap::from([("owner".to_string(), "someone".to_string())]);
        assert!(TransferMetadata::read(&map).unwrap().is_none());
    }

    #[test]
    fn test_rejects_newer_format_and_garbage() {
        let mut map = HashMap::new();
        TransferMetadata::new(16, 1).write(&mut map);
        map.insert(META_FORMAT_VERSION.to_string(), "2".to_string());
        let err = TransferMetadata::read(&map).unwrap_err();
        assert!(err.to_string().contains("format version 2"));

        map.insert(META_FORMAT_VERSION.to_string(), "1".to_string());
        map.insert(META_CHUNK_SIZE.to_string(), "lots".to_string());
        assert!(TransferMetadata::read(&map).is_err());
    }
}
