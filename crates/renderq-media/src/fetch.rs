//! Asset retrieval over HTTP.
//!
//! Downloads are streamed into a `.part` sibling of the destination and only
//! renamed into place once the whole body has been written, so a failed or
//! interrupted fetch never leaves a truncated input behind under the real name.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{MediaError, MediaResult};

/// Retrieves a remote asset into local scratch storage.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch `url` into `dest`, creating parent directories as needed.
    ///
    /// Returns the number of bytes written.
    async fn fetch(&self, url: &Url, dest: &Path) -> MediaResult<u64>;
}

/// [`AssetFetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> MediaResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("renderq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> MediaResult<u64> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        debug!("Fetching {} to {}", url, dest.display());

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::fetch_failed(
                url.as_str(),
                format!("HTTP {}", status),
                Some(status.as_u16()),
            ));
        }

        let part = partial_path(dest)?;
        let written = match write_body(response, &part).await {
            Ok(n) => n,
            Err(e) => {
                discard_partial(&part).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&part, dest).await {
            discard_partial(&part).await;
            return Err(e.into());
        }

        info!("Fetched {} ({} bytes) to {}", url, written, dest.display());
        Ok(written)
    }
}

/// Path used while a download is in progress: `<dest>.part`.
fn partial_path(dest: &Path) -> MediaResult<PathBuf> {
    let name = dest
        .file_name()
        .ok_or_else(|| MediaError::FileNotFound(dest.to_path_buf()))?;
    let mut part = name.to_os_string();
    part.push(".part");
    Ok(dest.with_file_name(part))
}

async fn discard_partial(part: &Path) {
    if let Err(e) = fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove partial file {}: {}", part.display(), e);
        }
    }
}

async fn write_body(response: reqwest::Response, path: &Path) -> MediaResult<u64> {
    let mut file = fs::File::create(path).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
