//! Streaming HTTP download to a file.
//!
//! The response body is written chunk by chunk and never held in memory.
//! A partially written file is removed when the transfer fails.

use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, Method};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

enum Auth<'a> {
    Basic(&'a str, Option<&'a str>),
    Bearer(&'a str),
}

/// Request for a download operation
pub struct DownloadRequest<'a> {
    client: &'a Client,
    method: Method,
    url: &'a str,
    dest: &'a Path,
    auth: Option<Auth<'a>>,
}

impl<'a> DownloadRequest<'a> {
    pub fn new(client: &'a Client, url: &'a str, dest: &'a Path) -> Self {
        Self {
            client,
            method: Method::GET,
            url,
            dest,
            auth: None,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_basic_auth(mut self, user: &'a str, password: Option<&'a str>) -> Self {
        self.auth = Some(Auth::Basic(user, password));
        self
    }

    pub fn with_bearer(mut self, token: &'a str) -> Self {
        self.auth = Some(Auth::Bearer(token));
        self
    }

    /// Execute the download, returning the number of bytes written.
    pub async fn execute(self) -> Result<u64, DownloadError> {
        let dest = self.dest;
        match stream_to_file(self).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }
}

async fn stream_to_file(req: DownloadRequest<'_>) -> Result<u64, DownloadError> {
    let mut builder = req
        .client
        .request(req.method, req.url)
        .header(reqwest::header::USER_AGENT, crate::USER_AGENT);
    builder = match req.auth {
        Some(Auth::Basic(user, password)) => builder.basic_auth(user, password),
        Some(Auth::Bearer(token)) => builder.bearer_auth(token),
        None => builder,
    };

    let response = builder.send().await?.error_for_status()?;
    let total_size = response.content_length();

    if let Some(parent) = req.dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = File::create(req.dest).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }

    file.flush().await?;
    debug!(
        url = req.url,
        downloaded,
        total_size,
        "wrote {}",
        req.dest.display()
    );
    Ok(downloaded)
}
