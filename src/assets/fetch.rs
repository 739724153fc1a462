use std::path::Path;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::progress::ProgressSink;

/// Streams a remote resource into a local file.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Write the body of `url` to `dest`, returning the byte count.
    /// Errors are plain strings; the pipeline wraps them as `DownloadFailed`.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> std::result::Result<u64, String>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> std::result::Result<u64, String> {
        info!("Downloading: {} (This could take a while...)", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let total = response.content_length();
        debug!("Content length: {:?}", total);

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| format!("failed to create {}: {}", dest.display(), e))?;

        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| url.to_string());
        progress.start(&label, total);

        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| format!("read failed after {} bytes: {}", downloaded, e))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write failed: {}", e))?;
            downloaded += chunk.len() as u64;
            progress.advance(downloaded);
        }

        file.flush().await.map_err(|e| format!("flush failed: {}", e))?;
        file.sync_all().await.map_err(|e| format!("sync failed: {}", e))?;
        progress.finish();

        if let Some(total) = total {
            if downloaded != total {
                return Err(format!("truncated body: {} of {} bytes", downloaded, total));
            }
        }

        Ok(downloaded)
    }
}
