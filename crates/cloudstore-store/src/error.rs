//! Store error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors reported by object store adapters
#[derive(Error, Debug)]
pub enum StoreError {
    /// Object does not exist
    #[error("Object not found: {bucket}/{key}")]
    NoSuchKey { bucket: String, key: String },

    /// Bucket does not exist
    #[error("The specified bucket is not valid: {0}")]
    NoSuchBucket(String),

    /// Multipart upload id is unknown (completed, aborted or never started)
    #[error("No such multipart upload: {0}")]
    NoSuchUpload(String),

    /// A part was rejected when completing a multipart upload
    #[error("Invalid part: {0}")]
    InvalidPart(String),

    /// Requested byte range cannot be satisfied
    #[error("Invalid range {start}..{end} for object of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    /// Access denied
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Request was throttled by the store
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// Store is temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// S3 API error not covered by a more specific variant
    #[error("S3 error ({code}, HTTP {status}): {message}")]
    S3Error {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed store URI
    #[error("Invalid URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// XML parsing error
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

impl StoreError {
    /// Map an S3 error response to a store error. `bucket` and `key`
    /// identify the object the request was about.
    pub fn from_s3_response(status: u16, body: &str, bucket: &str, key: Option<&str>) -> Self {
        let parsed: Option<ErrorBody> = quick_xml::de::from_str(body).ok();
        let (code, message, request_id) = match parsed {
            Some(b) => (b.code, b.message, b.request_id),
            None => (None, None, None),
        };
        let code = code.unwrap_or_else(|| default_code(status, key.is_some()).to_string());
        let message = message.unwrap_or_else(|| format!("HTTP {}", status));

        match code.as_str() {
            "NoSuchKey" | "NotFound" => Self::NoSuchKey {
                bucket: bucket.to_string(),
                key: key.unwrap_or_default().to_string(),
            },
            "NoSuchBucket" => Self::NoSuchBucket(bucket.to_string()),
            "NoSuchUpload" => Self::NoSuchUpload(message),
            "InvalidPart" | "InvalidPartOrder" | "EntityTooSmall" => Self::InvalidPart(message),
            "AccessDenied" => Self::AccessDenied(message),
            "SlowDown" | "Throttling" | "TooManyRequests" => Self::Throttled(message),
            "ServiceUnavailable" | "InternalError" => Self::Unavailable(message),
            _ => Self::S3Error {
                status,
                code,
                message,
                request_id,
            },
        }
    }

    /// Whether retrying the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Throttled(_) | Self::Unavailable(_) => true,
            Self::S3Error { status, code, .. } => {
                *status >= 500 || *status == 429 || code == "RequestTimeout"
            }
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Check if this is a "not found" error for an object or bucket
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchKey { .. } | Self::NoSuchBucket(_))
    }
}

fn default_code(status: u16, has_key: bool) -> &'static str {
    match status {
        404 if has_key => "NoSuchKey",
        404 => "NoSuchBucket",
        403 => "AccessDenied",
        429 => "TooManyRequests",
        503 => "ServiceUnavailable",
        s if s >= 500 => "InternalError",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_error() {
        let xml = r#"<?xml version="1.0"?>
<Error>
    <Code>NoSuchKey</Code>
    <Message>The specified key does not exist.</Message>
    <RequestId>abc123</RequestId>
</Error>"#;

        let error = StoreError::from_s3_response(404, xml, "b", Some("k"));
        match error {
            StoreError::NoSuchKey { bucket, key } => {
                assert_eq!(bucket, "b");
                assert_eq!(key, "k");
            }
            other => panic!("Expected NoSuchKey, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_code_keeps_details() {
        let xml = "<Error><Code>Weird</Code><Message>odd</Message><RequestId>r1</RequestId></Error>";
        match StoreError::from_s3_response(400, xml, "b", None) {
            StoreError::S3Error { code, message, request_id, status } => {
                assert_eq!(code, "Weird");
                assert_eq!(message, "odd");
                assert_eq!(request_id.as_deref(), Some("r1"));
                assert_eq!(status, 400);
            }
            other => panic!("Expected S3Error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_body_uses_status() {
        assert!(matches!(
            StoreError::from_s3_response(404, "", "b", None),
            StoreError::NoSuchBucket(_)
        ));
        assert!(StoreError::from_s3_response(503, "", "b", Some("k")).is_retryable());
        assert!(!StoreError::from_s3_response(403, "", "b", Some("k")).is_retryable());
    }

    #[test]
    fn test_bucket_message() {
        let err = StoreError::NoSuchBucket("nope".to_string());
        assert!(err.to_string().contains("specified bucket is not valid"));
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }
}
