//! Figure description via a vision model

use crate::config::MediaConfig;
use crate::error::{EmbedError, IngestError, Result};
use crate::http::{bearer_headers, HttpClient};
use crate::retry::{retry, RetryPolicy};
use crate::types::ExtractedImage;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Annotates extracted images with textual descriptions.
///
/// Implementations are called sequentially per document to respect
/// vision-model rate limits; batches annotate in place.
#[async_trait]
pub trait MediaDescriber: Send + Sync {
    /// Populate `description` (and OCR text when available) on each image
    async fn describe(&self, images: &mut [ExtractedImage], page_text: &str) -> Result<()>;

    /// Whether this describer does anything at all
    fn enabled(&self) -> bool {
        true
    }
}

/// No-op describer used when figure description is disabled
pub struct DisabledDescriber;

#[async_trait]
impl MediaDescriber for DisabledDescriber {
    async fn describe(&self, _images: &mut [ExtractedImage], _page_text: &str) -> Result<()> {
        Ok(())
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Vision-model describer speaking the OpenAI chat-completions shape
pub struct VisionDescriber {
    client: HttpClient,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl VisionDescriber {
    pub fn new(config: &MediaConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| {
            IngestError::ConfigInvalid("media.endpoint is required for vision mode".to_string())
        })?;

        Ok(Self {
            client: HttpClient::new(config.timeout),
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn prompt(image: &ExtractedImage, page_text: &str) -> String {
        let mut prompt = String::from(
            "Describe this figure from a document in two or three sentences. \
             Include any text visible in the figure.",
        );
        if let Some(caption) = &image.caption {
            prompt.push_str(&format!(" Its caption reads: {}", caption));
        }
        if !page_text.is_empty() {
            let context: String = page_text.chars().take(500).collect();
            prompt.push_str(&format!(" Surrounding page text: {}", context));
        }
        prompt
    }

    async fn describe_one(&self, image: &ExtractedImage, page_text: &str) -> Result<String> {
        let bytes = image.image_bytes.as_ref().ok_or_else(|| {
            IngestError::Embed(EmbedError::Api(format!(
                "figure {} has no image bytes",
                image.figure_id
            )))
        })?;
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: Self::prompt(image, page_text),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 300,
        };

        let url = format!(
            "{}/chat/completions",
            self.endpoint.trim_end_matches('/')
        );
        let headers = bearer_headers(self.api_key.as_deref());
        let response: ChatResponse = self.client.post_json(&url, &request, &headers).await?;

        let description = response
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        Ok(description)
    }
}

#[async_trait]
impl MediaDescriber for VisionDescriber {
    async fn describe(&self, images: &mut [ExtractedImage], page_text: &str) -> Result<()> {
        for image in images.iter_mut() {
            let result = retry(RetryPolicy::vision(), "describe figure", || {
                self.describe_one(image, page_text)
            })
            .await;

            match result {
                Ok(description) => {
                    debug!(
                        "Described figure {} ({} chars)",
                        image.figure_id,
                        description.len()
                    );
                    image.description = description;
                }
                // A failed figure stays undescribed; the document goes on
                Err(e) => {
                    warn!("Figure {} description failed: {}", image.figure_id, e);
                }
            }
        }
        Ok(())
    }
}
