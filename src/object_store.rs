//! Default `ObjectStore` implementation: a `reqwest`-backed S3-compatible
//! HTTP client.
//!
//! Grounded on `lnxdrive-graph/src/client.rs`'s `GraphClient`: a thin
//! wrapper holding a shared `reqwest::Client`, a base URL, and credentials,
//! exposing one `request()` builder that every public method threads
//! through. `anyhow::Context` is used the same way, to attach the failing
//! path/method to propagated errors.
//!
//! This is one concrete implementation of the [`ObjectStore`] port; the
//! Orchestrator depends only on the trait, never on this client directly.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::entry::EntryKind;
use crate::ports::{HeadResponse, ObjectStore, PutResponse};
use crate::reconciler::ListingRow;

/// Default connect/request timeout for the underlying `reqwest::Client`.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// S3-compatible HTTP client.
///
/// `endpoint` is the scheme+host (e.g. `https://s3.us-east-1.amazonaws.com`);
/// `bucket` is prefixed onto every path this client builds.
pub struct ObjectStoreClient {
    client: Client,
    endpoint: String,
    bucket: String,
    access_key: String,
    secret_key: String,
}

impl ObjectStoreClient {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client construction"),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Builds the full request URL for a key under this client's bucket.
    /// Paths sent over the wire are prefixed with `/` and percent-encoded
    /// by `reqwest`, not by this crate.
    fn url_for(&self, fullpath: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, fullpath)
    }

    /// Attaches the bearer-style credential header used by test doubles and
    /// simple deployments. A production deployment would replace this with
    /// full SigV4 signing; that signer is an external collaborator, out of
    /// this core's scope.
    fn authed(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("x-amz-access-key", &self.access_key)
            .header("x-amz-secret-key", &self.secret_key)
    }

    fn collect_headers(resp: &reqwest::Response) -> HashMap<String, String> {
        resp.headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect()
    }
}

#[async_trait::async_trait]
impl ObjectStore for ObjectStoreClient {
    async fn head(&self, fullpath: &str) -> Result<HeadResponse> {
        let url = self.url_for(fullpath);
        debug!(%fullpath, "HEAD request");
        let resp = self
            .authed(Method::HEAD, &url)
            .send()
            .await
            .with_context(|| format!("HEAD {fullpath} failed to send"))?;

        if resp.status() == StatusCode::NOT_FOUND {
            anyhow::bail!("404 not found: {fullpath}");
        }
        if !resp.status().is_success() {
            anyhow::bail!("HEAD {fullpath} returned {}", resp.status());
        }

        Ok(HeadResponse {
            headers: Self::collect_headers(&resp),
        })
    }

    async fn list_directory(&self, fullpath: &str) -> Result<Vec<ListingRow>> {
        let prefix = if fullpath.is_empty() {
            String::new()
        } else {
            format!("{fullpath}/")
        };
        let url = format!(
            "{}/{}?list-type=2&delimiter=/&prefix={}",
            self.endpoint.trim_end_matches('/'),
            self.bucket,
            prefix
        );
        debug!(%fullpath, "listing directory");
        let resp = self
            .authed(Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("listing {fullpath} failed to send"))?;

        if !resp.status().is_success() {
            anyhow::bail!("listing {fullpath} returned {}", resp.status());
        }

        let body = resp.text().await.context("reading listing response body")?;
        Ok(parse_list_bucket_result(&body, &prefix))
    }

    async fn put_empty(&self, fullpath: &str) -> Result<PutResponse> {
        self.put_with_headers(fullpath, Vec::new(), Vec::new()).await
    }

    async fn put_with_headers(
        &self,
        fullpath: &str,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    ) -> Result<PutResponse> {
        let url = self.url_for(fullpath);
        let mut req = self.authed(Method::PUT, &url).body(body);
        for (k, v) in &headers {
            req = req.header(k, v);
        }
        debug!(%fullpath, header_count = headers.len(), "PUT request");
        let resp = req.send().await.with_context(|| format!("PUT {fullpath} failed to send"))?;
        if !resp.status().is_success() {
            anyhow::bail!("PUT {fullpath} returned {}", resp.status());
        }
        Ok(PutResponse {
            headers: Self::collect_headers(&resp),
        })
    }

    async fn delete(&self, fullpath: &str) -> Result<()> {
        let url = self.url_for(fullpath);
        debug!(%fullpath, "DELETE request");
        let resp = self
            .authed(Method::DELETE, &url)
            .send()
            .await
            .with_context(|| format!("DELETE {fullpath} failed to send"))?;
        if !resp.status().is_success() {
            anyhow::bail!("DELETE {fullpath} returned {}", resp.status());
        }
        Ok(())
    }

    async fn get(&self, fullpath: &str) -> Result<Vec<u8>> {
        let url = self.url_for(fullpath);
        debug!(%fullpath, "GET request");
        let resp = self
            .authed(Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("GET {fullpath} failed to send"))?;
        if !resp.status().is_success() {
            anyhow::bail!("GET {fullpath} returned {}", resp.status());
        }
        Ok(resp.bytes().await.context("reading GET body")?.to_vec())
    }
}

/// Minimal `ListBucketResult` XML extractor: scans for `<Contents>` entries
/// (files) and `<CommonPrefixes>` entries (one-level subdirectories),
/// pulling `<Key>`/`<Size>`/`<LastModified>` by simple tag-delimited
/// scanning rather than a full XML parser — the teacher's dependency stack
/// carries no XML crate and this core only ever reads well-formed
/// S3-compatible listing responses.
fn parse_list_bucket_result(xml: &str, prefix: &str) -> Vec<ListingRow> {
    let mut rows = Vec::new();

    for block in extract_all(xml, "<Contents>", "</Contents>") {
        let Some(key) = extract_one(&block, "<Key>", "</Key>") else { continue };
        let Some(basename) = key.strip_prefix(prefix).filter(|b| !b.is_empty()) else { continue };
        let size = extract_one(&block, "<Size>", "</Size>")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let mtime = extract_one(&block, "<LastModified>", "</LastModified>")
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.into())
            .unwrap_or_else(std::time::SystemTime::now);
        rows.push(ListingRow {
            basename: basename.to_string(),
            kind: EntryKind::File,
            size,
            mtime,
        });
    }

    for block in extract_all(xml, "<CommonPrefixes>", "</CommonPrefixes>") {
        let Some(full_prefix) = extract_one(&block, "<Prefix>", "</Prefix>") else { continue };
        let trimmed = full_prefix.strip_prefix(prefix).unwrap_or(&full_prefix).trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }
        rows.push(ListingRow {
            basename: trimmed.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            mtime: std::time::SystemTime::now(),
        });
    }

    rows
}

fn extract_all(xml: &str, open: &str, close: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find(open) {
        let after_open = &rest[start + open.len()..];
        let Some(end) = after_open.find(close) else { break };
        out.push(after_open[..end].to_string());
        rest = &after_open[end + close.len()..];
    }
    out
}

fn extract_one(block: &str, open: &str, close: &str) -> Option<String> {
    let start = block.find(open)? + open.len();
    let end = block[start..].find(close)? + start;
    Some(block[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_files_and_subdirectories_from_listing_xml() {
        let xml = r#"
<ListBucketResult>
  <Contents><Key>sub/a.txt</Key><Size>3</Size><LastModified>2024-01-01T00:00:00Z</LastModified></Contents>
  <CommonPrefixes><Prefix>sub/nested/</Prefix></CommonPrefixes>
</ListBucketResult>
"#;
        let rows = parse_list_bucket_result(xml, "sub/");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.basename == "a.txt" && r.size == 3));
        assert!(rows.iter().any(|r| r.basename == "nested" && matches!(r.kind, EntryKind::Directory)));
    }

    #[test]
    fn empty_listing_produces_no_rows() {
        let rows = parse_list_bucket_result("<ListBucketResult></ListBucketResult>", "");
        assert!(rows.is_empty());
    }

    #[test]
    fn url_for_joins_endpoint_bucket_and_path() {
        let client = ObjectStoreClient::new("https://s3.example.com", "my-bucket", "ak", "sk");
        assert_eq!(client.url_for("a/b.txt"), "https://s3.example.com/my-bucket/a/b.txt");
    }
}
