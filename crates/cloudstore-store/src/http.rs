//! S3-compatible object store over HTTP

use crate::{
    CompletedPart, HttpStoreConfig, ObjectMetadata, ObjectStore, PendingUpload, Result, StoreError,
    StoreObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, instrument};

const META_PREFIX: &str = "x-amz-meta-";

/// Object store speaking the S3 REST API with path-style addressing
pub struct HttpObjectStore {
    config: HttpStoreConfig,
    http: Client,
}

/// One request against a bucket or an object
struct Request<'a> {
    method: Method,
    bucket: &'a str,
    key: Option<&'a str>,
    query: Vec<(&'static str, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl<'a> Request<'a> {
    fn new(method: Method, bucket: &'a str, key: Option<&'a str>) -> Self {
        Self {
            method,
            bucket,
            key,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn metadata(mut self, metadata: &ObjectMetadata) -> Self {
        if let Some(ct) = &metadata.content_type {
            self = self.header("Content-Type", ct.clone());
        }
        if let Some(acl) = &metadata.canned_acl {
            self = self.header("x-amz-acl", acl.clone());
        }
        for (k, v) in &metadata.user_metadata {
            self = self.header(format!("{}{}", META_PREFIX, k), v.clone());
        }
        self
    }

    fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

impl HttpObjectStore {
    /// Create a new store client with the given configuration
    pub fn new(config: HttpStoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| StoreError::Config(format!("invalid user agent: {}", e)))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { config, http })
    }

    /// Get the configuration
    pub fn config(&self) -> &HttpStoreConfig {
        &self.config
    }

    fn url(&self, bucket: &str, key: Option<&str>) -> String {
        match key {
            Some(key) => format!("{}/{}/{}", self.config.base_url(), bucket, encode_key(key)),
            None => format!("{}/{}", self.config.base_url(), bucket),
        }
    }

    async fn send(&self, request: Request<'_>) -> Result<Response> {
        let url = self.url(request.bucket, request.key);
        let mut req = self.http.request(request.method.clone(), &url);

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(token) = &self.config.access_token {
            req = req.bearer_auth(token);
        }
        for (k, v) in request.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| StoreError::Config(format!("invalid header name {}: {}", k, e)))?;
            let value = HeaderValue::from_str(&v)
                .map_err(|e| StoreError::Config(format!("invalid header value for {}: {}", k, e)))?;
            req = req.header(name, value);
        }
        if let Some(data) = request.body {
            req = req.body(data);
        }

        debug!("Sending {} request to {}", request.method, url);
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::from_s3_response(
                status.as_u16(),
                &text,
                request.bucket,
                request.key,
            ));
        }
        Ok(response)
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.send(Request::new(Method::HEAD, bucket, None)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NoSuchBucket(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<StoreObject> {
        let response = self.send(Request::new(Method::HEAD, bucket, Some(key))).await?;
        Ok(object_from_headers(bucket, key, response.headers()))
    }

    #[instrument(skip(self, data, metadata), fields(size = data.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: &ObjectMetadata,
    ) -> Result<StoreObject> {
        let size = data.len() as u64;
        let response = self
            .send(Request::new(Method::PUT, bucket, Some(key)).metadata(metadata).body(data))
            .await?;

        Ok(StoreObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag: etag_header(response.headers()),
            last_modified: Utc::now(),
            user_metadata: metadata.user_metadata.clone(),
        })
    }

    #[instrument(skip(self))]
    async fn get_range(&self, bucket: &str, key: &str, range: Range<u64>) -> Result<Bytes> {
        if range.start >= range.end {
            return Ok(Bytes::new());
        }
        let response = self
            .send(
                Request::new(Method::GET, bucket, Some(key))
                    .header("Range", format!("bytes={}-{}", range.start, range.end - 1)),
            )
            .await?;
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self))]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<StoreObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = Request::new(Method::GET, bucket, None)
                .query("list-type", "2")
                .query("prefix", prefix)
                .query("max-keys", self.config.list_page_size.to_string());
            if !recursive {
                request = request.query("delimiter", "/");
            }
            if let Some(token) = continuation.take() {
                request = request.query("continuation-token", token);
            }

            let text = self.send(request).await?.text().await?;
            let page: ListBucketResult = parse_xml(&text)?;
            objects.extend(page.contents.into_iter().map(|entry| StoreObject {
                bucket: bucket.to_string(),
                key: entry.key,
                size: entry.size,
                etag: entry.etag.trim_matches('"').to_string(),
                last_modified: entry
                    .last_modified
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&Utc))
                    .unwrap_or_else(Utc::now),
                user_metadata: HashMap::new(),
            }));

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation = Some(token),
                _ => break,
            }
        }

        debug!(count = objects.len(), "listed objects");
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.send(Request::new(Method::DELETE, bucket, Some(key))).await?;
        Ok(())
    }

    #[instrument(skip(self, metadata))]
    async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        dest_bucket: &str,
        dest_key: &str,
        metadata: Option<&ObjectMetadata>,
    ) -> Result<StoreObject> {
        let mut request = Request::new(Method::PUT, dest_bucket, Some(dest_key)).header(
            "x-amz-copy-source",
            format!("/{}/{}", source_bucket, encode_key(source_key)),
        );
        if let Some(metadata) = metadata {
            request = request
                .header("x-amz-metadata-directive", "REPLACE")
                .metadata(metadata);
        }

        // NoSuchKey from a copy refers to the source object
        let text = match self.send(request).await {
            Err(StoreError::NoSuchKey { .. }) => {
                return Err(StoreError::NoSuchKey {
                    bucket: source_bucket.to_string(),
                    key: source_key.to_string(),
                })
            }
            other => other?.text().await?,
        };
        if text.contains("<Error>") {
            return Err(StoreError::from_s3_response(500, &text, dest_bucket, Some(dest_key)));
        }
        self.head_object(dest_bucket, dest_key).await
    }

    #[instrument(skip(self, metadata))]
    async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        metadata: &ObjectMetadata,
    ) -> Result<String> {
        let text = self
            .send(
                Request::new(Method::POST, bucket, Some(key))
                    .query("uploads", "")
                    .metadata(metadata),
            )
            .await?
            .text()
            .await?;
        let result: InitiateMultipartUploadResult = parse_xml(&text)?;
        Ok(result.upload_id)
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<CompletedPart> {
        let response = self
            .send(
                Request::new(Method::PUT, bucket, Some(key))
                    .query("partNumber", part_number.to_string())
                    .query("uploadId", upload_id)
                    .body(data),
            )
            .await?;
        Ok(CompletedPart {
            part_number,
            etag: etag_header(response.headers()),
        })
    }

    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<StoreObject> {
        let body = CompleteMultipartUpload {
            parts: parts
                .iter()
                .map(|p| PartEntry {
                    part_number: p.part_number,
                    etag: format!("\"{}\"", p.etag),
                })
                .collect(),
        };
        let xml = quick_xml::se::to_string(&body).map_err(|e| StoreError::XmlParse(e.to_string()))?;

        let text = self
            .send(
                Request::new(Method::POST, bucket, Some(key))
                    .query("uploadId", upload_id)
                    .header("Content-Type", "application/xml")
                    .body(Bytes::from(xml)),
            )
            .await?
            .text()
            .await?;

        // S3 may report a failed completion with a 200 and an error body
        if text.contains("<Error>") {
            return Err(StoreError::from_s3_response(500, &text, bucket, Some(key)));
        }
        self.head_object(bucket, key).await
    }

    #[instrument(skip(self))]
    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.send(Request::new(Method::DELETE, bucket, Some(key)).query("uploadId", upload_id))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_pending_uploads(&self, bucket: &str, prefix: &str) -> Result<Vec<PendingUpload>> {
        let mut uploads = Vec::new();
        let mut markers: Option<(String, String)> = None;

        loop {
            let mut request = Request::new(Method::GET, bucket, None)
                .query("uploads", "")
                .query("prefix", prefix)
                .query("max-uploads", self.config.list_page_size.to_string());
            if let Some((key, upload_id)) = markers.take() {
                request = request
                    .query("key-marker", key)
                    .query("upload-id-marker", upload_id);
            }

            let text = self.send(request).await?.text().await?;
            let page: ListMultipartUploadsResult = parse_xml(&text)?;
            for entry in page.uploads {
                let initiated = DateTime::parse_from_rfc3339(&entry.initiated)
                    .map_err(|e| {
                        StoreError::XmlParse(format!(
                            "bad initiation time '{}': {}",
                            entry.initiated, e
                        ))
                    })?
                    .with_timezone(&Utc);
                uploads.push(PendingUpload {
                    bucket: bucket.to_string(),
                    key: entry.key,
                    upload_id: entry.upload_id,
                    initiated,
                });
            }

            match (page.next_key_marker, page.next_upload_id_marker) {
                (Some(key), Some(upload_id)) if page.is_truncated => {
                    markers = Some((key, upload_id))
                }
                _ => break,
            }
        }

        debug!(count = uploads.len(), "listed pending uploads");
        Ok(uploads)
    }

    fn min_part_size(&self) -> u64 {
        self.config.min_part_size
    }
}

// ==================== XML Bodies ====================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ListEntry>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
    #[serde(default)]
    size: u64,
    #[serde(rename = "ETag", default)]
    etag: String,
    #[serde(default)]
    last_modified: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListMultipartUploadsResult {
    #[serde(rename = "Upload", default)]
    uploads: Vec<UploadEntry>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_key_marker: Option<String>,
    #[serde(default)]
    next_upload_id_marker: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UploadEntry {
    key: String,
    upload_id: String,
    initiated: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateMultipartUploadResult {
    upload_id: String,
}

#[derive(Serialize)]
#[serde(rename = "CompleteMultipartUpload")]
struct CompleteMultipartUpload {
    #[serde(rename = "Part")]
    parts: Vec<PartEntry>,
}

#[derive(Serialize)]
struct PartEntry {
    #[serde(rename = "PartNumber")]
    part_number: u32,
    #[serde(rename = "ETag")]
    etag: String,
}

fn parse_xml<T: for<'de> Deserialize<'de>>(xml: &str) -> Result<T> {
    quick_xml::de::from_str(xml).map_err(|e| StoreError::XmlParse(e.to_string()))
}

// ==================== Header Helpers ====================

fn etag_header(headers: &HeaderMap) -> String {
    headers
        .get("ETag")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
        .unwrap_or_default()
}

fn object_from_headers(bucket: &str, key: &str, headers: &HeaderMap) -> StoreObject {
    let size = headers
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let last_modified = headers
        .get("Last-Modified")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let mut user_metadata = HashMap::new();
    for (name, value) in headers.iter() {
        if let Some(meta_key) = name.as_str().strip_prefix(META_PREFIX) {
            if let Ok(v) = value.to_str() {
                user_metadata.insert(meta_key.to_string(), v.to_string());
            }
        }
    }

    StoreObject {
        bucket: bucket.to_string(),
        key: key.to_string(),
        size,
        etag: etag_header(headers),
        last_modified,
        user_metadata,
    }
}

/// Percent-encode a key for use in a URL path, keeping `/` separators
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(server: &MockServer) -> HttpObjectStore {
        HttpObjectStore::new(HttpStoreConfig::new(server.uri()).with_token("secret")).unwrap()
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("a/b c.txt"), "a/b%20c.txt");
        assert_eq!(encode_key("x?y#z"), "x%3Fy%23z");
    }

    #[tokio::test]
    async fn test_head_reads_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/dir/file"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"abc\"")
                    .insert_header("x-amz-meta-chunk-size", "1024"),
            )
            .mount(&server)
            .await;

        let object = store(&server).await.head_object("bucket", "dir/file").await.unwrap();
        assert_eq!(object.etag, "abc");
        assert_eq!(object.user_metadata["chunk-size"], "1024");
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_no_such_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/nope"))
            .respond_with(ResponseTemplate::new(404).set_body_string(
                "<Error><Code>NoSuchKey</Code><Message>missing</Message></Error>",
            ))
            .mount(&server)
            .await;

        let err = store(&server).await.get_range("bucket", "nope", 0..10).await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchKey { .. }));
    }

    #[tokio::test]
    async fn test_get_range_sends_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket/obj"))
            .and(header("Range", "bytes=16-31"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(vec![1u8; 16]))
            .mount(&server)
            .await;

        let data = store(&server).await.get_range("bucket", "obj", 16..32).await.unwrap();
        assert_eq!(data.len(), 16);
    }

    #[tokio::test]
    async fn test_list_follows_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("continuation-token", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ListBucketResult><IsTruncated>false</IsTruncated>
                <Contents><Key>p/b</Key><Size>2</Size><ETag>"e2"</ETag></Contents>
                </ListBucketResult>"#,
            ))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("prefix", "p/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ListBucketResult><IsTruncated>true</IsTruncated>
                <NextContinuationToken>t1</NextContinuationToken>
                <Contents><Key>p/a</Key><Size>1</Size><ETag>"e1"</ETag>
                <LastModified>2024-01-01T00:00:00.000Z</LastModified></Contents>
                </ListBucketResult>"#,
            ))
            .with_priority(2)
            .mount(&server)
            .await;

        let objects = store(&server).await.list_objects("bucket", "p/", true).await.unwrap();
        let keys: Vec<_> = objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["p/a", "p/b"]);
        assert_eq!(objects[0].etag, "e1");
    }

    #[tokio::test]
    async fn test_multipart_flow() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bucket/big"))
            .and(query_param("uploads", ""))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<InitiateMultipartUploadResult><Bucket>bucket</Bucket><Key>big</Key>\
                 <UploadId>u-1</UploadId></InitiateMultipartUploadResult>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/bucket/big"))
            .and(query_param("uploadId", "u-1"))
            .and(query_param("partNumber", "1"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"p1\""))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bucket/big"))
            .and(query_param("uploadId", "u-1"))
            .and(body_string_contains("<PartNumber>1</PartNumber>"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CompleteMultipartUploadResult><ETag>\"x-1\"</ETag></CompleteMultipartUploadResult>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/bucket/big"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"x-1\""))
            .mount(&server)
            .await;

        let store = store(&server).await;
        let id = store.initiate_multipart("bucket", "big", &ObjectMetadata::new()).await.unwrap();
        assert_eq!(id, "u-1");
        let part = store
            .upload_part("bucket", "big", &id, 1, Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert_eq!(part.etag, "p1");
        let object = store.complete_multipart("bucket", "big", &id, &[part]).await.unwrap();
        assert_eq!(object.etag, "x-1");
    }

    #[tokio::test]
    async fn test_list_pending_uploads_follows_markers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("uploads", ""))
            .and(query_param("key-marker", "tmp/a"))
            .and(query_param("upload-id-marker", "u-1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ListMultipartUploadsResult><IsTruncated>false</IsTruncated>
                <Upload><Key>tmp/b</Key><UploadId>u-2</UploadId>
                <Initiated>2024-03-02T10:00:00.000Z</Initiated></Upload>
                </ListMultipartUploadsResult>"#,
            ))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/bucket"))
            .and(query_param("uploads", ""))
            .and(query_param("prefix", "tmp/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ListMultipartUploadsResult><IsTruncated>true</IsTruncated>
                <NextKeyMarker>tmp/a</NextKeyMarker><NextUploadIdMarker>u-1</NextUploadIdMarker>
                <Upload><Key>tmp/a</Key><UploadId>u-1</UploadId>
                <Initiated>2024-03-01T08:30:00.000Z</Initiated></Upload>
                </ListMultipartUploadsResult>"#,
            ))
            .with_priority(2)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/bucket/tmp/a"))
            .and(query_param("uploadId", "u-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server).await;
        let uploads = store.list_pending_uploads("bucket", "tmp/").await.unwrap();
        let ids: Vec<_> = uploads.iter().map(|u| u.upload_id.as_str()).collect();
        assert_eq!(ids, vec!["u-1", "u-2"]);
        assert_eq!(uploads[0].initiated.to_rfc3339(), "2024-03-01T08:30:00+00:00");

        let cutoff = DateTime::parse_from_rfc3339("2024-03-02T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let aborted = store.abort_pending_uploads("bucket", "tmp/", cutoff).await.unwrap();
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].key, "tmp/a");
    }

    #[tokio::test]
    async fn test_copy_replace_metadata_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/dst/key2"))
            .and(header("x-amz-copy-source", "/src/key1"))
            .and(header("x-amz-metadata-directive", "REPLACE"))
            .and(header("x-amz-meta-key-name", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CopyObjectResult><ETag>\"c\"</ETag></CopyObjectResult>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/dst/key2"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"c\""))
            .mount(&server)
            .await;

        let meta = ObjectMetadata::new().with_entry("key-name", "k1");
        let object = store(&server)
            .await
            .copy_object("src", "key1", "dst", "key2", Some(&meta))
            .await
            .unwrap();
        assert_eq!(object.key, "key2");
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string(
                "<Error><Code>SlowDown</Code><Message>reduce rate</Message></Error>",
            ))
            .mount(&server)
            .await;

        let err = store(&server).await.delete_object("bucket", "k").await.unwrap_err();
        assert!(matches!(err, StoreError::Throttled(_)));
        assert!(err.is_retryable());
    }
}
