use crate::rate::RateVariation;
use crate::scene::SceneOptions;
use crate::traits::TextModel;
use crate::types::{CatalogEntry, RunContext};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds prompt variables for the text model and applies the local recovery rules.
pub struct CaptionService {
    model: Arc<dyn TextModel>,
    caption_prompt: String,
    background_prompt: String,
}

impl CaptionService {
    pub fn new(model: Arc<dyn TextModel>, caption_prompt: String, background_prompt: String) -> Self {
        Self {
            model,
            caption_prompt,
            background_prompt,
        }
    }

    /// Caption for the post. Never fails: any model error yields `"#<index> - <NAME>"`.
    pub async fn generate_caption(
        &self,
        ctx: &RunContext,
        entry: &CatalogEntry,
        variation: &RateVariation,
        history: &[String],
    ) -> String {
        let variables = match caption_variables(ctx, entry, variation, history) {
            Ok(variables) => variables,
            Err(e) => {
                error!("Could not encode caption variables: {}", e);
                return fallback_caption(entry);
            }
        };

        info!("Generating caption with {}", self.model.model_name());
        match self.model.complete(&self.caption_prompt, &variables).await {
            Ok(text) => {
                let caption = strip_wrapping_quotes(&text).trim().to_string();
                if caption.is_empty() {
                    warn!("Text model returned an empty caption; using default caption");
                    fallback_caption(entry)
                } else {
                    caption
                }
            }
            Err(e) => {
                error!("Caption generation failed: {}", e);
                info!("Returning default caption");
                fallback_caption(entry)
            }
        }
    }

    /// Background prompt for the special asset; `None` when the model fails.
    pub async fn background_description(
        &self,
        entry: &CatalogEntry,
        scene: &SceneOptions,
    ) -> Option<String> {
        let pokemon_data = match to_json(&json!({ "pokemon": entry, "scene": scene })) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not encode background variables, continuing without one: {}", e);
                return None;
            }
        };
        let mut variables = BTreeMap::new();
        variables.insert("pokemon_data".to_string(), pokemon_data);

        info!(
            "Generating background description ({:?}, {:?}, {:?})",
            scene.time_of_day, scene.weather, scene.season
        );
        match self.model.complete(&self.background_prompt, &variables).await {
            Ok(text) => {
                let text = strip_wrapping_quotes(&text).trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Err(e) => {
                warn!("Background description failed, continuing without one: {}", e);
                None
            }
        }
    }
}

pub fn fallback_caption(entry: &CatalogEntry) -> String {
    format!("#{} - {}", entry.number, entry.name)
}

/// Drop one leading and one trailing `"` when both are present.
pub fn strip_wrapping_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        &trimmed[1..trimmed.len() - 1]
    } else {
        text
    }
}

fn caption_variables(
    ctx: &RunContext,
    entry: &CatalogEntry,
    variation: &RateVariation,
    history: &[String],
) -> serde_json::Result<BTreeMap<String, String>> {
    let mut variables = BTreeMap::new();
    variables.insert("dollar_variation".to_string(), variation.describe());
    variables.insert("dollar_price".to_string(), ctx.rate.clone());
    variables.insert(
        "day_of_week".to_string(),
        ctx.started_at.format("%d/%m/%y").to_string(),
    );
    variables.insert("pokemon_data".to_string(), to_json(entry)?);
    variables.insert("captions_history".to_string(), to_json(history)?);
    Ok(variables)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}
