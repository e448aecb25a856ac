use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::errors::{GenerateError, GenerateResult};
use crate::models::content::ContentPart;
use crate::models::data::DataContent;
use crate::models::message::Message;
use crate::providers::base::LanguageModel;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedContent {
    pub data: Vec<u8>,
    /// Content type reported by the server, if any
    pub mime_type: Option<String>,
}

/// Fetches content that message parts reference by URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, url: &Url) -> GenerateResult<DownloadedContent>;
}

/// Plain HTTP(S) GET.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    pub fn new() -> GenerateResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| GenerateError::invalid_argument("downloader", e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &Url) -> GenerateResult<DownloadedContent> {
        let download_error = |status_code: Option<u16>, message: String| GenerateError::Download {
            url: url.to_string(),
            status_code,
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| download_error(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(download_error(
                Some(status.as_u16()),
                format!("server responded with {status}"),
            ));
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let data = response
            .bytes()
            .await
            .map_err(|e| download_error(Some(status.as_u16()), e.to_string()))?
            .to_vec();

        Ok(DownloadedContent { data, mime_type })
    }
}

/// Replace URL-referenced image and file content the model cannot fetch itself
/// with the downloaded bytes.
pub async fn inline_unsupported_urls(
    messages: Vec<Message>,
    model: &dyn LanguageModel,
    downloader: &dyn Downloader,
    retry: &RetryPolicy,
) -> GenerateResult<Vec<Message>> {
    let mut inlined = Vec::with_capacity(messages.len());
    for mut message in messages {
        for part in message.content.iter_mut() {
            let url = match &*part {
                ContentPart::Image(image) => image.image.as_url(),
                ContentPart::File(file) => file.data.as_url(),
                _ => None,
            };
            let Some(url) = url.filter(|url| !model.supports_url(url)).cloned() else {
                continue;
            };

            debug!(%url, "downloading content the model cannot fetch");
            let downloaded = retry.run(|| downloader.download(&url)).await?;
            match part {
                ContentPart::Image(image) => {
                    image.image = DataContent::Bytes(downloaded.data);
                    if image.mime_type.is_none() {
                        image.mime_type = downloaded.mime_type;
                    }
                }
                ContentPart::File(file) => file.data = DataContent::Bytes(downloaded.data),
                _ => {}
            }
        }
        inlined.push(message);
    }
    Ok(inlined)
}
