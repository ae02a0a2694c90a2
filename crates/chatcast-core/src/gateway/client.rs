//! WhatsApp-Business-style Cloud API client.

use super::{Gateway, GatewayError, GatewayFactory, TemplateSend};
use async_trait::async_trait;
use chatcast_common::config::GatewayConfig;
use chatcast_storage::models::Channel;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Cloud API client bound to one channel's credentials
pub struct CloudApiClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    phone_number_id: String,
    access_token: String,
}

impl CloudApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_version: String,
        phone_number_id: String,
        access_token: String,
    ) -> Self {
        Self {
            http,
            base_url,
            api_version,
            phone_number_id,
            access_token,
        }
    }

    fn api_url(&self, suffix: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url, self.api_version, self.phone_number_id, suffix
        )
    }

    fn build_payload(send: &TemplateSend) -> serde_json::Value {
        let mut template = serde_json::json!({
            "name": send.template_name,
            "language": { "code": send.language },
        });

        if !send.parameters.is_empty() {
            let parameters: Vec<serde_json::Value> = send
                .parameters
                .iter()
                .map(|text| serde_json::json!({ "type": "text", "text": text }))
                .collect();
            template["components"] = serde_json::json!([
                { "type": "body", "parameters": parameters }
            ]);
        }

        // is_marketing_lite selects the provider's lightweight marketing
        // throughput tier and is set on every template send
        serde_json::json!({
            "messaging_product": "whatsapp",
            "to": send.to,
            "type": "template",
            "is_marketing_lite": true,
            "template": template,
        })
    }
}

#[async_trait]
impl Gateway for CloudApiClient {
    async fn send_template(&self, send: &TemplateSend) -> Result<String, GatewayError> {
        let payload = Self::build_payload(send);

        debug!(
            to = %send.to,
            template = %send.template_name,
            language = %send.language,
            "Dispatching template send"
        );

        let resp = self
            .http
            .post(self.api_url("messages"))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let detail: ErrorResponse = serde_json::from_str(&body).unwrap_or(ErrorResponse {
                error: None,
            });
            let (code, message) = match detail.error {
                Some(e) => (
                    e.code.map(|c| c.to_string()),
                    e.message.unwrap_or_else(|| body.clone()),
                ),
                None => (None, body),
            };
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                code,
                message,
            });
        }

        let data: SendResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        data.messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| {
                GatewayError::InvalidResponse("response carried no message id".to_string())
            })
    }
}

/// Factory producing [`CloudApiClient`]s from stored channel credentials
pub struct CloudApiFactory {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl CloudApiFactory {
    pub fn new(config: &GatewayConfig) -> Result<Self, chatcast_common::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| chatcast_common::Error::Config(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_version: config.api_version.clone(),
        })
    }
}

impl GatewayFactory for CloudApiFactory {
    fn for_channel(&self, channel: &Channel) -> Arc<dyn Gateway> {
        Arc::new(CloudApiClient::new(
            self.http.clone(),
            self.base_url.clone(),
            self.api_version.clone(),
            channel.phone_number_id.clone(),
            channel.access_token.clone(),
        ))
    }
}
