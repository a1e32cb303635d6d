//! Remote API client: book id resolution, metadata, chapter list, chapter
//! bodies, and image downloads.
//!
//! Metadata is fetched exactly once and a failure is fatal; chapter bodies
//! and images run through the injected [`FetchPolicy`] retry loop and report
//! failure through their return value, never through an error.

use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use ranopress_shared::{
    Attachment, FetchPolicy, NetworkConfig, RanopressError, Result, VolumeKey,
};

use crate::content::ChapterContent;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("RanoPress/", env!("CARGO_PKG_VERSION"));

/// Known reference shapes carrying a book id, e.g.
/// `/ru/book/1234--some-title` or `/ru/1234--some-title/`.
static ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"/ru/book/(\d+--[\w-]+)").expect("valid regex"),
        Regex::new(r"/ru/(\d+--[\w-]+)/").expect("valid regex"),
    ]
});

/// Extract the canonical book id from an input reference.
pub fn resolve_book_id(reference: &str) -> Result<String> {
    for pattern in ID_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(reference) {
            return Ok(captures[1].to_string());
        }
    }
    Err(RanopressError::reference(format!(
        "no known pattern matched '{reference}'"
    )))
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// `data` envelope wrapping every API response body.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Book metadata as returned by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookInfo {
    /// Localized display title.
    #[serde(default)]
    pub rus_name: Option<String>,
    /// Original title.
    #[serde(default)]
    pub name: Option<String>,
    /// Description text.
    #[serde(default)]
    pub summary: Option<String>,
}

/// One entry of the chapter list.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterStub {
    pub id: u64,
    #[serde(deserialize_with = "de_label")]
    pub volume: String,
    #[serde(deserialize_with = "de_number")]
    pub number: f64,
    #[serde(default)]
    pub name: String,
}

/// A fetched chapter body with its attachments and raw content shape.
#[derive(Debug, Clone, Deserialize)]
pub struct ChapterData {
    pub id: u64,
    #[serde(deserialize_with = "de_label")]
    pub volume: String,
    #[serde(deserialize_with = "de_number")]
    pub number: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub content: ChapterContent,
}

/// The API serves volume labels and chapter numbers as either strings or
/// bare numbers; normalize both to a string label.
fn de_label<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

fn de_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("chapter number out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("chapter number '{s}': {e}"))),
        other => Err(serde::de::Error::custom(format!(
            "unexpected chapter number: {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client bound to the source site's API and origin.
pub struct ApiClient {
    client: Client,
    api_base: String,
    site_base: String,
}

impl ApiClient {
    /// Create a client with limited redirects and a per-attempt timeout,
    /// leaving retry to the callers' policies.
    pub fn new(network: &NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RanopressError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: network.api_base.trim_end_matches('/').to_string(),
            site_base: network.site_base.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch book metadata. Single attempt: without metadata the run cannot
    /// proceed, so any failure is fatal.
    pub async fn fetch_metadata(&self, book_id: &str) -> Result<BookInfo> {
        let url = format!("{}/{book_id}?fields[]=summary", self.api_base);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RanopressError::metadata(format!("{book_id}: {e}")))?;

        if !response.status().is_success() {
            return Err(RanopressError::metadata(format!(
                "{book_id}: HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope<BookInfo> = response
            .json()
            .await
            .map_err(|e| RanopressError::metadata(format!("{book_id}: invalid payload: {e}")))?;

        Ok(envelope.data)
    }

    /// Fetch the cover image URL. Best-effort: `None` on any failure.
    pub async fn fetch_cover_url(&self, book_id: &str) -> Option<String> {
        let url = format!("{}/{book_id}", self.api_base);

        let envelope: Envelope<Value> = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(book_id, error = %e, "cover payload unreadable");
                    return None;
                }
            },
            Ok(r) => {
                warn!(book_id, status = %r.status(), "cover lookup failed");
                return None;
            }
            Err(e) => {
                warn!(book_id, error = %e, "cover lookup failed");
                return None;
            }
        };

        envelope
            .data
            .pointer("/cover/default")
            .and_then(Value::as_str)
            .map(String::from)
    }

    /// Fetch the ordered chapter list. An empty list on failure — the run
    /// continues and yields an empty book.
    pub async fn fetch_chapter_list(&self, book_id: &str) -> Vec<ChapterStub> {
        let url = format!("{}/{book_id}/chapters", self.api_base);

        let envelope: Envelope<Vec<ChapterStub>> = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => match r.json().await {
                Ok(v) => v,
                Err(e) => {
                    warn!(book_id, error = %e, "chapter list unreadable");
                    return Vec::new();
                }
            },
            Ok(r) => {
                warn!(book_id, status = %r.status(), "chapter list fetch failed");
                return Vec::new();
            }
            Err(e) => {
                warn!(book_id, error = %e, "chapter list fetch failed");
                return Vec::new();
            }
        };

        let mut chapters = envelope.data;
        chapters.sort_by(|a, b| {
            VolumeKey::parse(&a.volume)
                .cmp(&VolumeKey::parse(&b.volume))
                .then(a.number.total_cmp(&b.number))
        });
        chapters
    }

    /// Fetch one chapter body, retrying on any non-success response or
    /// transport error with the policy's fixed backoff. Exhaustion yields
    /// `None`; this never errors.
    pub async fn fetch_chapter_body(
        &self,
        book_id: &str,
        volume: &str,
        number: f64,
        policy: &FetchPolicy,
    ) -> Option<ChapterData> {
        let number_param = format_chapter_number(number);
        let url = format!(
            "{}/{book_id}/chapter?number={number_param}&volume={volume}",
            self.api_base
        );

        for attempt in 1..=policy.max_attempts {
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    match response.json::<Envelope<ChapterData>>().await {
                        Ok(envelope) => return Some(envelope.data),
                        Err(e) => {
                            warn!(
                                volume,
                                number,
                                attempt,
                                max_attempts = policy.max_attempts,
                                error = %e,
                                "chapter payload unreadable"
                            );
                        }
                    }
                }
                Ok(response) => {
                    warn!(
                        volume,
                        number,
                        attempt,
                        max_attempts = policy.max_attempts,
                        status = %response.status(),
                        "chapter fetch failed"
                    );
                }
                Err(e) => {
                    warn!(
                        volume,
                        number,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "chapter fetch failed"
                    );
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }

        None
    }

    /// Download an image to `dest`, retrying per the policy. Site-relative
    /// URLs (e.g. `/uploads/...`) resolve against the site origin.
    /// Returns whether the file was written; never errors.
    pub async fn fetch_image(&self, url: &str, dest: &Path, policy: &FetchPolicy) -> bool {
        let absolute = if url.starts_with("http") {
            url.to_string()
        } else {
            match Url::parse(&self.site_base).and_then(|base| base.join(url)) {
                Ok(resolved) => resolved.to_string(),
                Err(e) => {
                    warn!(url, error = %e, "image URL not resolvable");
                    return false;
                }
            }
        };

        for attempt in 1..=policy.max_attempts {
            match self.client.get(&absolute).send().await {
                Ok(response) if response.status().is_success() => match response.bytes().await {
                    Ok(bytes) => {
                        if let Some(parent) = dest.parent() {
                            if let Err(e) = std::fs::create_dir_all(parent) {
                                warn!(path = %parent.display(), error = %e, "cannot create image dir");
                                return false;
                            }
                        }
                        match std::fs::write(dest, &bytes) {
                            Ok(()) => {
                                debug!(url = %absolute, path = %dest.display(), "image saved");
                                return true;
                            }
                            Err(e) => {
                                warn!(path = %dest.display(), error = %e, "cannot write image");
                                return false;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(url = %absolute, attempt, error = %e, "image body read failed");
                    }
                },
                Ok(response) => {
                    warn!(
                        url = %absolute,
                        attempt,
                        max_attempts = policy.max_attempts,
                        status = %response.status(),
                        "image fetch failed"
                    );
                }
                Err(e) => {
                    warn!(url = %absolute, attempt, error = %e, "image fetch failed");
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.backoff).await;
            }
        }

        false
    }
}

/// The API expects whole chapter numbers without a trailing `.0`.
fn format_chapter_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}
