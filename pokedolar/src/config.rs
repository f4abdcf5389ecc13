use crate::types::{MediaKind, PipelineError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// HTTP client settings shared by every outbound service.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "PokeDolar/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateSourceKind {
    Awesome,
    Wise,
}

impl FromStr for RateSourceKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "awesome" => Ok(RateSourceKind::Awesome),
            "wise" => Ok(RateSourceKind::Wise),
            other => Err(PipelineError::Config(format!("unknown rate source: {}", other))),
        }
    }
}

/// Chances are percentages; their sum may exceed 100, which always succeeds.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub base_chance: f64,
    pub final_stage_bonus: f64,
    pub variation_threshold: f64,
    pub variation_bonus: f64,
    pub window_days: i64,
    pub always_special: bool,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            base_chance: 5.0,
            final_stage_bonus: 5.0,
            variation_threshold: 0.05,
            variation_bonus: 10.0,
            window_days: 30,
            always_special: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub rate_source: RateSourceKind,
    pub awesome_api_url: String,
    pub wise_api_url: String,
    pub pokeapi_url: String,
    pub max_descriptions: usize,
    pub selector: SelectorConfig,
    pub poll: PollConfig,
    pub media_kind: MediaKind,
    pub text_model_url: String,
    pub caption_prompt: String,
    pub background_prompt: String,
    pub caption_history: usize,
    pub renderer_url: String,
    pub storage_url: String,
    pub presign_ttl: Duration,
    pub graph_api_url: String,
    pub instagram_account_id: String,
    pub database_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            rate_source: RateSourceKind::Awesome,
            awesome_api_url: "https://economia.awesomeapi.com.br/json/last/USD-BRL".to_string(),
            wise_api_url: "https://api.wise.com/v1/rates?source=USD&target=BRL".to_string(),
            pokeapi_url: "https://pokeapi.co/api/v2".to_string(),
            max_descriptions: 3,
            selector: SelectorConfig::default(),
            poll: PollConfig::default(),
            media_kind: MediaKind::Image,
            text_model_url: "http://localhost:8081/converse".to_string(),
            caption_prompt: "caption".to_string(),
            background_prompt: "background".to_string(),
            caption_history: 4,
            renderer_url: "http://localhost:8082/render".to_string(),
            storage_url: "http://localhost:8083/pokedolarbucket".to_string(),
            presign_ttl: Duration::from_secs(120),
            graph_api_url: "https://graph.facebook.com/v21.0".to_string(),
            instagram_account_id: String::new(),
            database_url: None,
        }
    }
}

impl PipelineConfig {
    /// Build from the process environment, falling back to defaults for unset keys.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let fetch = FetchConfig {
            user_agent: env_or("HTTP_USER_AGENT", &defaults.fetch.user_agent),
            timeout_seconds: env_parse("HTTP_TIMEOUT_SECONDS", defaults.fetch.timeout_seconds)?,
            max_retries: env_parse("HTTP_MAX_RETRIES", defaults.fetch.max_retries)?,
            retry_delay_seconds: env_parse(
                "HTTP_RETRY_DELAY_SECONDS",
                defaults.fetch.retry_delay_seconds,
            )?,
        };

        let selector = SelectorConfig {
            base_chance: env_parse(
                "SPECIAL_IMAGE_INITIAL_PERCENTAGE_CHANCE",
                defaults.selector.base_chance,
            )?,
            final_stage_bonus: env_parse(
                "SPECIAL_IMAGE_FINAL_EVOLUTION_PERCENTAGE_CHANCE",
                defaults.selector.final_stage_bonus,
            )?,
            variation_threshold: env_parse(
                "SPECIAL_IMAGE_DOLLAR_CENTS_VARIATION",
                defaults.selector.variation_threshold,
            )?,
            variation_bonus: env_parse(
                "SPECIAL_IMAGE_DOLLAR_CENTS_VARIATION_PERCENTAGE_CHANCE",
                defaults.selector.variation_bonus,
            )?,
            window_days: env_parse("SPECIAL_IMAGE_WINDOW_DAYS", defaults.selector.window_days)?,
            always_special: env_parse("ALWAYS_SPECIAL_IMAGE", defaults.selector.always_special)?,
        };

        let poll = PollConfig {
            interval: Duration::from_secs(env_parse(
                "MEDIA_POLL_INTERVAL_SECONDS",
                defaults.poll.interval.as_secs(),
            )?),
            max_attempts: env_parse("MEDIA_POLL_MAX_ATTEMPTS", defaults.poll.max_attempts)?,
        };

        let config = Self {
            fetch,
            rate_source: env_parse("RATE_SOURCE", defaults.rate_source)?,
            awesome_api_url: env_or("AWESOMEAPI_DOLLAR_URL", &defaults.awesome_api_url),
            wise_api_url: env_or("WISEAPI_DOLLAR_URL", &defaults.wise_api_url),
            pokeapi_url: env_or("POKEAPI_URL", &defaults.pokeapi_url),
            max_descriptions: env_parse("POKEMON_MAX_DESCRIPTIONS", defaults.max_descriptions)?,
            selector,
            poll,
            media_kind: env_parse("MEDIA_KIND", defaults.media_kind)?,
            text_model_url: env_or("TEXT_MODEL_URL", &defaults.text_model_url),
            caption_prompt: env_or("CAPTION_PROMPT", &defaults.caption_prompt),
            background_prompt: env_or("BACKGROUND_PROMPT", &defaults.background_prompt),
            caption_history: env_parse("CAPTION_HISTORY_SIZE", defaults.caption_history)?,
            renderer_url: env_or("RENDERER_URL", &defaults.renderer_url),
            storage_url: env_or("STORAGE_URL", &defaults.storage_url),
            presign_ttl: Duration::from_secs(env_parse(
                "PRESIGN_TTL_SECONDS",
                defaults.presign_ttl.as_secs(),
            )?),
            graph_api_url: env_or("INSTAGRAM_GRAPH_API_URL", &defaults.graph_api_url),
            instagram_account_id: env_or("INSTAGRAM_ACCOUNT_ID", &defaults.instagram_account_id),
            database_url: env::var("DATABASE_URL").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll.max_attempts == 0 {
            return Err(PipelineError::Config(
                "MEDIA_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.selector.window_days < 0 {
            return Err(PipelineError::Config(
                "SPECIAL_IMAGE_WINDOW_DAYS must not be negative".to_string(),
            ));
        }
        if self.max_descriptions == 0 {
            return Err(PipelineError::Config(
                "POKEMON_MAX_DESCRIPTIONS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| PipelineError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
