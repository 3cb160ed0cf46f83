//! Discord attachment host
//!
//! Chunks are posted as message attachments to one channel; expired CDN links
//! are renewed through the `attachments/refresh-urls` endpoint.

use super::traits::{AttachmentHost, BlobStream};
use crate::config::HostConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Longest slice of an error body kept in error messages
const ERROR_BODY_LIMIT: usize = 300;

/// [`AttachmentHost`] backed by the Discord REST API
pub struct DiscordHost {
    client: reqwest::Client,
    api_base: String,
    bot_token: Option<String>,
    user_token: Option<String>,
    channel_id: Option<String>,
    upload_timeout: Duration,
    refresh_timeout: Duration,
    fetch_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    attachment_urls: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    refreshed_urls: Vec<RefreshedUrl>,
}

#[derive(Debug, Deserialize)]
struct RefreshedUrl {
    original: String,
    refreshed: String,
}

impl DiscordHost {
    /// Create a host client from configuration
    ///
    /// Tokens are checked lazily: a download-only setup needs no bot token and
    /// an upload-only setup needs no user token.
    pub fn new(config: &HostConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            user_token: config.user_token.clone(),
            channel_id: config.channel_id.clone(),
            upload_timeout: config.upload_timeout,
            refresh_timeout: config.refresh_timeout,
            fetch_timeout: config.fetch_timeout,
        })
    }

    fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| Error::Config {
            message: format!("{key} is not configured"),
            key: Some(key.to_string()),
        })
    }
}

async fn with_timeout<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation,
            seconds: limit.as_secs(),
        }),
    }
}

/// Turn a non-success response into `Error::Host`, keeping the start of the body
async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();

    Error::Host {
        status: Some(status.as_u16()),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    }
}

#[async_trait]
impl AttachmentHost for DiscordHost {
    async fn upload_blob(&self, data: Bytes, label: &str) -> Result<String> {
        let bot_token = Self::require(&self.bot_token, "host.bot_token")?;
        let channel_id = Self::require(&self.channel_id, "host.channel_id")?;
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let len = data.len() as u64;

        with_timeout("upload", self.upload_timeout, async {
            let part = reqwest::multipart::Part::stream_with_length(data, len)
                .file_name(label.to_string())
                .mime_str("application/octet-stream")?;
            let content = match label.rsplit_once(".part") {
                Some((_, index)) => format!("Uploading chunk {index}"),
                None => format!("Uploading {label}"),
            };
            let form = reqwest::multipart::Form::new()
                .text("content", content)
                .part("file", part);

            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bot {bot_token}"))
                .multipart(form)
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let message: MessageResponse = response.json().await?;
            message
                .attachments
                .into_iter()
                .next()
                .map(|a| a.url)
                .ok_or_else(|| Error::Host {
                    status: None,
                    message: "message was created without an attachment".into(),
                })
        })
        .await
    }

    async fn refresh_urls(&self, urls: &[String]) -> Result<Vec<String>> {
        let user_token = Self::require(&self.user_token, "host.user_token")?;
        let url = format!("{}/attachments/refresh-urls", self.api_base);

        with_timeout("refresh", self.refresh_timeout, async {
            let response = self
                .client
                .post(&url)
                .header("Authorization", user_token)
                .json(&RefreshRequest {
                    attachment_urls: urls,
                })
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let body: RefreshResponse = response.json().await?;
            align_refreshed(urls, body.refreshed_urls)
        })
        .await
    }

    async fn fetch_blob(&self, url: &str) -> Result<BlobStream> {
        let response = with_timeout("fetch", self.fetch_timeout, async {
            Ok(self.client.get(url).send().await?)
        })
        .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(response
            .bytes_stream()
            .map(|piece| piece.map_err(Error::from))
            .boxed())
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

/// Put refreshed URLs in request order by their `original` field
fn align_refreshed(requested: &[String], mut answer: Vec<RefreshedUrl>) -> Result<Vec<String>> {
    requested
        .iter()
        .map(|url| -> Result<String> {
            let position = answer
                .iter()
                .position(|r| r.original == *url)
                .ok_or_else(|| Error::Host {
                    status: None,
                    message: format!("refresh response has no entry for {url}"),
                })?;
            Ok(answer.swap_remove(position).refreshed)
        })
        .collect()
}
