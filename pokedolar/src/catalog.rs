use crate::fetcher::Fetcher;
use crate::traits::CatalogLookup;
use crate::types::{CatalogEntry, PipelineError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

const NO_DESCRIPTION: &str = "No description available.";

/// Catalog backed by a PokeAPI-compatible service.
pub struct PokeApiCatalog {
    base_url: String,
    fetcher: Fetcher,
    max_descriptions: usize,
}

impl PokeApiCatalog {
    pub fn new(base_url: String, fetcher: Fetcher, max_descriptions: usize) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fetcher,
            max_descriptions,
        }
    }

    async fn fetch(&self, index: u32, url: &str) -> Result<Value> {
        self.fetcher
            .get_json(url, None)
            .await
            .map_err(|e| PipelineError::CatalogLookup {
                index,
                message: e.to_string(),
            })
    }

    async fn is_final_stage(&self, species: &Value, species_name: &str) -> Result<bool> {
        let chain_url = species
            .pointer("/evolution_chain/url")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::Upstream("species has no evolution chain".to_string()))?;

        let chain = self.fetcher.get_json(chain_url, None).await?;
        let root = chain
            .get("chain")
            .ok_or_else(|| PipelineError::Upstream("evolution chain has no root".to_string()))?;

        Ok(is_last_stage(root, species_name))
    }
}

#[async_trait]
impl CatalogLookup for PokeApiCatalog {
    async fn lookup(&self, index: u32) -> Result<CatalogEntry> {
        let pokemon_url = format!("{}/pokemon/{}", self.base_url, index);
        info!("Fetching Pokemon from {}", pokemon_url);

        let pokemon = self.fetch(index, &pokemon_url).await?;
        let missing = |field: &str| PipelineError::CatalogLookup {
            index,
            message: format!("response has no {}", field),
        };

        let species_name = pokemon
            .pointer("/species/name")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("species name"))?
            .to_string();
        let species_url = pokemon
            .pointer("/species/url")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("species url"))?
            .to_string();

        let types = pokemon
            .get("types")
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(|t| t.pointer("/type/name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let species = self.fetch(index, &species_url).await?;
        let descriptions = english_flavor_texts(&species, self.max_descriptions);
        let habitat = species
            .pointer("/habitat/name")
            .and_then(Value::as_str)
            .map(str::to_string);

        let is_final_stage = match self.is_final_stage(&species, &species_name).await {
            Ok(is_final) => is_final,
            Err(e) => {
                warn!("Could not resolve evolution chain for #{}: {}", index, e);
                false
            }
        };

        let entry = CatalogEntry {
            number: index,
            name: species_name.to_uppercase(),
            types,
            descriptions,
            habitat,
            is_final_stage,
        };

        info!(
            "Fetched Pokemon {} (#{} | final stage: {})",
            entry.name, entry.number, entry.is_final_stage
        );
        Ok(entry)
    }
}

/// Distinct English flavor texts with layout characters flattened to spaces.
fn english_flavor_texts(species: &Value, limit: usize) -> Vec<String> {
    let mut texts: Vec<String> = Vec::new();

    let entries = species
        .get("flavor_text_entries")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for entry in entries {
        if entry.pointer("/language/name").and_then(Value::as_str) != Some("en") {
            continue;
        }
        let Some(text) = entry.get("flavor_text").and_then(Value::as_str) else {
            continue;
        };
        let text = text
            .replace(['\n', '\u{000c}'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() && !texts.contains(&text) {
            texts.push(text);
        }
        if texts.len() >= limit {
            break;
        }
    }

    if texts.is_empty() {
        debug!("No English flavor text found");
        texts.push(NO_DESCRIPTION.to_string());
    }
    texts
}

/// Whether `name` sits at the end of its branch in an evolution chain node tree.
fn is_last_stage(node: &Value, name: &str) -> bool {
    let evolves_to = node
        .get("evolves_to")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    if node.pointer("/species/name").and_then(Value::as_str) == Some(name) {
        return evolves_to.is_empty();
    }
    evolves_to.iter().any(|next| is_last_stage(next, name))
}
