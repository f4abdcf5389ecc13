//! Probabilistic choice between the default rendering and the special asset.

use crate::config::SelectorConfig;
use crate::traits::RandomSource;
use crate::types::PublicationRecord;
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

/// Operating-system entropy; the default draw source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn percent(&self) -> f64 {
        OsRng.gen_range(0.0..100.0)
    }

    fn pick(&self, len: usize) -> usize {
        OsRng.gen_range(0..len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpecialAssetDecision {
    pub special: bool,
    /// Accumulated chance in percent; may exceed 100.
    pub chance: f64,
    /// The uniform draw compared against `chance`, absent when no draw was made.
    pub draw: Option<f64>,
}

pub struct SpecialAssetSelector {
    config: SelectorConfig,
    random: Arc<dyn RandomSource>,
}

impl SpecialAssetSelector {
    pub fn new(config: SelectorConfig, random: Arc<dyn RandomSource>) -> Self {
        Self { config, random }
    }

    pub fn window_days(&self) -> i64 {
        self.config.window_days
    }

    /// Decide for `pokemon` given its recent special publications inside the window.
    ///
    /// A recent special publication suppresses the asset outright; otherwise
    /// the base chance grows with the final-stage and variation bonuses and a
    /// single draw in `[0, 100)` settles it.
    pub fn decide(
        &self,
        pokemon: &str,
        is_final_stage: bool,
        variation: f64,
        recent_specials: &[PublicationRecord],
    ) -> SpecialAssetDecision {
        let mut chance = self.config.base_chance;
        debug!("Initial special asset chance: {}%", chance);

        if !recent_specials.is_empty() {
            info!(
                "Recent special asset found for {} ({} in the last {} days); using default asset",
                pokemon,
                recent_specials.len(),
                self.config.window_days
            );
            return SpecialAssetDecision {
                special: false,
                chance,
                draw: None,
            };
        }

        if self.config.always_special {
            info!("Special asset forced by configuration for {}", pokemon);
            return SpecialAssetDecision {
                special: true,
                chance: 100.0,
                draw: None,
            };
        }

        if is_final_stage {
            chance += self.config.final_stage_bonus;
            info!("{} is a final stage; chance raised to {}%", pokemon, chance);
        }

        if variation >= self.config.variation_threshold {
            chance += self.config.variation_bonus;
            info!("Significant rate variation {:.2}; chance raised to {}%", variation, chance);
        }

        let draw = self.random.percent();
        let special = draw < chance;
        info!(
            "Special asset decision for {}: {} (chance {}%, draw {:.2})",
            pokemon, special, chance, draw
        );

        SpecialAssetDecision {
            special,
            chance,
            draw: Some(draw),
        }
    }
}
