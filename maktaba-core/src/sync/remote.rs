//! Client for the remote patch API.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors that can occur while talking to the patch API.
///
/// URLs are reported without their query string, which carries the API key
/// or a download signature.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Answer to a master update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterPatch {
    UpToDate,
    /// A patch up to `version`. Without a URL there is nothing to merge and
    /// only the cursor moves.
    Available {
        patch_url: Option<String>,
        version: u64,
    },
}

/// Answer to a book update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookPatch {
    UpToDate,
    Available {
        major_release_url: Option<String>,
        minor_release_url: Option<String>,
        major: u64,
        minor: u64,
    },
}

/// The remote end of a sync.
#[async_trait]
pub trait PatchSource: Send + Sync {
    /// Checks for master updates since `version`.
    async fn master_patch(&self, version: u64) -> Result<MasterPatch, RemoteError>;

    /// Checks for updates of a book since release `major.minor`.
    async fn book_patch(&self, book_id: i64, major: u64, minor: u64) -> Result<BookPatch, RemoteError>;

    /// Downloads a patch archive.
    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

#[derive(Debug, Deserialize)]
struct MasterPatchResponse {
    #[serde(default, deserialize_with = "non_empty")]
    patch_url: Option<String>,
    #[serde(rename = "Version", alias = "version", deserialize_with = "version_number")]
    version: u64,
}

#[derive(Debug, Deserialize)]
struct BookPatchResponse {
    #[serde(default, deserialize_with = "non_empty")]
    major_release_url: Option<String>,
    #[serde(default, deserialize_with = "non_empty")]
    minor_release_url: Option<String>,
    #[serde(deserialize_with = "version_number")]
    major_release: u64,
    #[serde(deserialize_with = "version_number")]
    minor_release: u64,
}

/// Accepts `5` as well as `"5"`.
fn version_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid version number {:?}", s))),
    }
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let url = Option::<String>::deserialize(deserializer)?;
    Ok(url.filter(|u| !u.trim().is_empty()))
}

fn redact(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

/// [`PatchSource`] over the HTTP patch API.
#[derive(Debug, Clone)]
pub struct HttpPatchSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpPatchSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the deadline of each request, downloads included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// GETs `path`; `Ok(None)` on 204.
    async fn check<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, RemoteError> {
        let url = self.endpoint(path);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
                url: url.clone(),
                source: e.without_url(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport {
                url: url.clone(),
                source: e.without_url(),
            })?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| RemoteError::Decode {
                url,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl PatchSource for HttpPatchSource {
    async fn master_patch(&self, version: u64) -> Result<MasterPatch, RemoteError> {
        let response: Option<MasterPatchResponse> = self
            .check("patches/master", &[("version", version.to_string())])
            .await?;

        Ok(match response {
            None => MasterPatch::UpToDate,
            Some(r) => MasterPatch::Available {
                patch_url: r.patch_url,
                version: r.version,
            },
        })
    }

    async fn book_patch(&self, book_id: i64, major: u64, minor: u64) -> Result<BookPatch, RemoteError> {
        let path = format!("patches/book-updates/{}", book_id);
        let response: Option<BookPatchResponse> = self
            .check(
                &path,
                &[
                    ("major_release", major.to_string()),
                    ("minor_release", minor.to_string()),
                ],
            )
            .await?;

        Ok(match response {
            None => BookPatch::UpToDate,
            Some(r) => BookPatch::Available {
                major_release_url: r.major_release_url,
                minor_release_url: r.minor_release_url,
                major: r.major_release,
                minor: r.minor_release,
            },
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let transport = |e: reqwest::Error| RemoteError::Transport {
            url: redact(url),
            source: e.without_url(),
        };

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: redact(url),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        tracing::debug!(url = %redact(url), bytes = bytes.len(), "downloaded patch archive");
        Ok(bytes.to_vec())
    }
}
