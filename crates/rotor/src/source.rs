//! Executor source loading
//!
//! Each [`WorkerScript`] is inline text, optionally prefixed by text fetched
//! from a [`SourceLocation`]. Every executor in a pool runs the concatenation
//! of all resolved scripts.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

/// Where a script's external body lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Fetched over HTTP(S)
    Remote(Url),
    /// Read from the local filesystem
    File(PathBuf),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => write!(f, "{url}"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One executable payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerScript {
    pub location: Option<SourceLocation>,
    pub inline: String,
}

impl WorkerScript {
    /// Script whose body is given inline
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            location: None,
            inline: text.into(),
        }
    }

    /// Script fetched from a URL
    pub fn remote(url: &str) -> Result<Self, LoadError> {
        let url = Url::parse(url).map_err(|e| LoadError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            location: Some(SourceLocation::Remote(url)),
            inline: String::new(),
        })
    }

    /// Script read from a file
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Some(SourceLocation::File(path.into())),
            inline: String::new(),
        }
    }

    /// Inline text appended after the fetched body
    pub fn with_inline(mut self, text: impl Into<String>) -> Self {
        self.inline = text.into();
        self
    }
}

/// Errors from loading executor sources
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// Transport failure
    #[error("network error fetching {location}: {reason}")]
    Network { location: String, reason: String },

    /// Server answered with something other than 200
    #[error("fetching {location} failed: {status}")]
    Status { location: String, status: String },

    /// Local read failure
    #[error("reading {location} failed: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Resolves source locations to text
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn fetch(&self, location: &SourceLocation) -> Result<String, LoadError>;
}

/// Loader for HTTP and file locations
#[derive(Debug, Clone, Default)]
pub struct DefaultSourceLoader {
    client: reqwest::Client,
}

impl DefaultSourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_remote(&self, url: &Url) -> Result<String, LoadError> {
        let network = |e: reqwest::Error| LoadError::Network {
            location: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url.clone()).send().await.map_err(network)?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(LoadError::Status {
                location: url.to_string(),
                status: status.to_string(),
            });
        }

        response.text().await.map_err(network)
    }
}

#[async_trait]
impl SourceLoader for DefaultSourceLoader {
    async fn fetch(&self, location: &SourceLocation) -> Result<String, LoadError> {
        debug!(%location, "Fetching executor source");
        match location {
            SourceLocation::Remote(url) => self.fetch_remote(url).await,
            SourceLocation::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| LoadError::Io {
                        location: path.display().to_string(),
                        source,
                    })
            }
        }
    }
}

/// Resolve one script: fetched body followed by its inline text
pub async fn resolve_script(
    loader: &dyn SourceLoader,
    script: &WorkerScript,
) -> Result<String, LoadError> {
    match &script.location {
        Some(location) => {
            let mut text = loader.fetch(location).await?;
            text.push_str(&script.inline);
            Ok(text)
        }
        None => Ok(script.inline.clone()),
    }
}

/// Resolve all scripts concurrently and concatenate them in order
///
/// Fails on the first script that cannot be loaded.
pub async fn resolve_scripts(
    loader: &dyn SourceLoader,
    scripts: &[WorkerScript],
) -> Result<String, LoadError> {
    let bodies = try_join_all(scripts.iter().map(|s| resolve_script(loader, s))).await?;
    Ok(bodies.concat())
}
