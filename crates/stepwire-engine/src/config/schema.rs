use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use stepwire_core::idfilter::{GeneratedIdFilter, IdRule, DEFAULT_SHORT_ALLOWLIST};
use tracing::warn;

use crate::replay::ReplayOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepwireConfig {
    #[serde(default)]
    pub replay: ReplayTimingConfig,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayTimingConfig {
    /// Upper bound on one element wait.
    #[serde(default = "default_resolve_timeout_ms")]
    pub resolve_timeout_ms: u64,
    /// Gap between the Enter key-down and key-up.
    #[serde(default = "default_keyup_delay_ms")]
    pub keyup_delay_ms: u64,
}

impl Default for ReplayTimingConfig {
    fn default() -> Self {
        Self {
            resolve_timeout_ms: default_resolve_timeout_ms(),
            keyup_delay_ms: default_keyup_delay_ms(),
        }
    }
}

fn default_resolve_timeout_ms() -> u64 {
    15000
}

fn default_keyup_delay_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Extra regexes appended to the generated-id filter.
    #[serde(default)]
    pub extra_generated_id_patterns: Vec<String>,
    /// Short ids trusted despite their length.
    #[serde(default = "default_short_id_allowlist")]
    pub short_id_allowlist: Vec<String>,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            extra_generated_id_patterns: Vec::new(),
            short_id_allowlist: default_short_id_allowlist(),
        }
    }
}

fn default_short_id_allowlist() -> Vec<String> {
    DEFAULT_SHORT_ALLOWLIST.iter().map(|s| s.to_string()).collect()
}

impl StepwireConfig {
    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions {
            resolve_timeout: Duration::from_millis(self.replay.resolve_timeout_ms),
            keyup_delay: Duration::from_millis(self.replay.keyup_delay_ms),
        }
    }

    /// Generated-id filter with the configured allowlist and extra
    /// patterns. Unparseable patterns are logged and skipped.
    pub fn id_filter(&self) -> GeneratedIdFilter {
        let mut filter =
            GeneratedIdFilter::with_allowlist(self.synthesizer.short_id_allowlist.clone());
        for pattern in &self.synthesizer.extra_generated_id_patterns {
            match Regex::new(pattern) {
                Ok(regex) => filter.push(IdRule::pattern(pattern.clone(), regex)),
                Err(error) => {
                    warn!(pattern, %error, "ignoring invalid generated-id pattern");
                }
            }
        }
        filter
    }
}
