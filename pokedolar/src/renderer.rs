use crate::config::FetchConfig;
use crate::fetcher::build_client;
use crate::traits::{AssetRenderer, RenderRequest, RenderedAsset};
use crate::types::{MediaKind, PipelineError, Result, RunContext};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct RenderPayload<'a> {
    request_id: Uuid,
    image: String,
    dollar_rate: &'a str,
    dollar_up: bool,
    pokedex_number: u32,
    pokemon_name: &'a str,
    special_image: bool,
    background_description: &'a str,
    media_kind: MediaKind,
}

/// Rendering backend behind an HTTP endpoint returning a `{statusCode, body}` envelope.
pub struct HttpRenderer {
    client: Client,
    endpoint: String,
}

impl HttpRenderer {
    pub fn new(endpoint: String, fetch_config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(fetch_config)?,
            endpoint,
        })
    }
}

#[async_trait]
impl AssetRenderer for HttpRenderer {
    async fn render(&self, ctx: &RunContext, request: &RenderRequest) -> Result<RenderedAsset> {
        let payload = RenderPayload {
            request_id: ctx.request_id,
            image: STANDARD.encode(&request.base_image),
            dollar_rate: &request.dollar_rate,
            dollar_up: request.dollar_up,
            pokedex_number: request.pokedex_number,
            pokemon_name: &request.pokemon_name,
            special_image: request.special_image,
            background_description: request.background_description.as_deref().unwrap_or_default(),
            media_kind: request.media_kind,
        };

        info!(
            "Rendering {:?} for #{} (special: {})",
            request.media_kind, request.pokedex_number, request.special_image
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::AssetRender(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::AssetRender(format!(
                "renderer returned HTTP {}",
                status.as_u16()
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::AssetRender(e.to_string()))?;

        match request.media_kind {
            MediaKind::Image => {
                let image = decode_image(&envelope)?;
                debug!("Renderer returned {} image bytes", image.len());
                Ok(RenderedAsset::Image(image))
            }
            MediaKind::Video => {
                check_status(&envelope)?;
                Ok(RenderedAsset::Video)
            }
        }
    }
}

/// Fails when the envelope carries a non-2xx `statusCode`.
fn check_status(envelope: &Value) -> Result<()> {
    match envelope.get("statusCode").and_then(Value::as_u64) {
        Some(code) if !(200..300).contains(&code) => Err(PipelineError::AssetRender(format!(
            "renderer reported status {}",
            code
        ))),
        _ => Ok(()),
    }
}

/// Pull the base64 `image` out of the envelope `body`, which may itself be a JSON string.
pub(crate) fn decode_image(envelope: &Value) -> Result<Vec<u8>> {
    check_status(envelope)?;

    let body = match envelope.get("body") {
        Some(Value::String(raw)) => serde_json::from_str::<Value>(raw)
            .map_err(|e| PipelineError::AssetRender(format!("invalid body: {}", e)))?,
        Some(body) => body.clone(),
        None => return Err(PipelineError::AssetRender("response has no body".to_string())),
    };

    let encoded = body
        .get("image")
        .and_then(Value::as_str)
        .ok_or_else(|| PipelineError::AssetRender("response body has no image".to_string()))?;

    STANDARD
        .decode(encoded)
        .map_err(|e| PipelineError::AssetRender(format!("invalid image encoding: {}", e)))
}
