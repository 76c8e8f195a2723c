//! Webhook attachment host
//!
//! Each payload becomes one message posted through a channel webhook, carrying
//! the payload as its single attachment. The message id is the reference.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::WebhookConfig;
use crate::error::{Result, StoreError};

use super::BlobStore;

const SERVICE: &str = "webhook";

/// Blob store posting attachments through a webhook URL
#[derive(Clone)]
pub struct WebhookBlobStore {
    client: reqwest::Client,
    url: String,
    max_attachment_size: u64,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
struct Attachment {
    url: String,
}

impl WebhookBlobStore {
    pub fn new(config: &WebhookConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            max_attachment_size: config.max_attachment_size,
        }
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/messages/{}", self.url, urlencoding::encode(id))
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let response = self.client.get(self.message_url(id)).send().await?;
        let body = read_body(response, id).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Message text shown next to each attachment
fn sidecar(plaintext_size: u64) -> String {
    let content = serde_json::json!({ "size": plaintext_size }).to_string();
    serde_json::json!({ "content": content }).to_string()
}

async fn read_body(response: reqwest::Response, what: &str) -> Result<Vec<u8>> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(StoreError::NotFound(format!("message {}", what)));
    }
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(StoreError::UnexpectedRemoteResponse {
            service: SERVICE,
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }
    Ok(body.to_vec())
}

fn delete_failure(status: StatusCode, body: String) -> StoreError {
    StoreError::UnexpectedRemoteResponse {
        service: SERVICE,
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl BlobStore for WebhookBlobStore {
    async fn put(&self, name: &str, payload: Vec<u8>, plaintext_size: u64) -> Result<String> {
        let size = payload.len();
        let part = Part::bytes(payload)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("payload_json", sidecar(plaintext_size))
            .part("files[0]", part);

        let response = self
            .client
            .post(format!("{}?wait=true", self.url))
            .multipart(form)
            .send()
            .await?;

        let body = read_body(response, name).await?;
        let message: Message = serde_json::from_slice(&body)?;
        tracing::trace!(message_id = %message.id, name, size, "Posted attachment");
        Ok(message.id)
    }

    async fn get(&self, reference: &str) -> Result<Vec<u8>> {
        let message = self.get_message(reference).await?;
        let attachment = message.attachments.first().ok_or_else(|| {
            StoreError::InvariantViolation(format!("message {} has no attachment", reference))
        })?;

        let response = self.client.get(&attachment.url).send().await?;
        read_body(response, reference).await
    }

    async fn delete(&self, reference: &str) -> Result<()> {
        let response = self.client.delete(self.message_url(reference)).send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(());
        }
        // A message that is already gone is a failure too
        Err(delete_failure(status, response.text().await.unwrap_or_default()))
    }

    fn max_payload_size(&self) -> Option<u64> {
        Some(self.max_attachment_size)
    }
}
