//! # Pipeline Configuration
//!
//! Iteration budgets, retry policy, quality settings and model selection.
//! Every field has a default, so a config file only needs the values it
//! changes.
//!
//! ```json
//! {
//!   "iterations": { "design_decomposition_max": 5, "validation_max": { "max": 4 } },
//!   "retry": { "max_retries": 2 },
//!   "models": { "global_provider": "openai", "global_model": "gpt-4o" }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::models::ModelSettings;
use crate::quality::citation::DEFAULT_FRESHNESS_DAYS;
use crate::quality::completeness::CompletenessConfig;

/// Iteration cap that may be disabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationLimit {
    Unlimited,
    Max(u32),
}

impl IterationLimit {
    /// Whether `used` iterations leave room for another
    pub fn allows(&self, used: u32) -> bool {
        match self {
            IterationLimit::Unlimited => true,
            IterationLimit::Max(max) => used < *max,
        }
    }

    pub fn as_option(&self) -> Option<u32> {
        match self {
            IterationLimit::Unlimited => None,
            IterationLimit::Max(max) => Some(*max),
        }
    }
}

/// Loop budgets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Maximum discovery runs in the discovery/challenge loop
    pub discovery_challenge_max: u32,
    /// Maximum design runs in the design/decomposition loop (per entry)
    pub design_decomposition_max: u32,
    /// Maximum validation attempts
    pub validation_max: IterationLimit,
    /// Confidence required to pass; only 100 is accepted
    pub min_confidence: u8,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            discovery_challenge_max: 3,
            design_decomposition_max: 3,
            validation_max: IterationLimit::Unlimited,
            min_confidence: 100,
        }
    }
}

/// Retry policy for collaborator calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Per-attempt timeout
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            timeout_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    /// Policy without delays, for tests and local collaborators
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay after the `retry`-th failure (0-based): `min(base * 2^retry, cap)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.checked_pow(retry).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Validator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Age after which a decision's verification date is stale
    pub citation_freshness_days: u32,
    pub completeness: CompletenessConfig,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            citation_freshness_days: DEFAULT_FRESHNESS_DAYS,
            completeness: CompletenessConfig::default(),
        }
    }
}

/// The two bounded feedback loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPair {
    DiscoveryChallenge,
    DesignDecomposition,
}

impl fmt::Display for LoopPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopPair::DiscoveryChallenge => f.write_str("discovery/challenge"),
            LoopPair::DesignDecomposition => f.write_str("design/decomposition"),
        }
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub iterations: IterationConfig,
    pub retry: RetryPolicy,
    pub quality: QualityConfig,
    /// LLM selection for the built-in collaborator
    pub models: ModelSettings,
    /// Fail the run when a loop budget runs out while its signal is still
    /// raised (otherwise the run continues with a warning advisory)
    pub strict_loop_budgets: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iterations: IterationConfig::default(),
            retry: RetryPolicy::default(),
            quality: QualityConfig::default(),
            models: ModelSettings::default(),
            strict_loop_budgets: false,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let iterations = &self.iterations;
        if iterations.min_confidence != 100 {
            return Err(ConfigError::Invalid(format!(
                "min_confidence must be 100, got {}",
                iterations.min_confidence
            )));
        }
        if iterations.discovery_challenge_max == 0 {
            return Err(ConfigError::Invalid(
                "discovery_challenge_max must be at least 1".into(),
            ));
        }
        if iterations.design_decomposition_max == 0 {
            return Err(ConfigError::Invalid(
                "design_decomposition_max must be at least 1".into(),
            ));
        }
        if iterations.validation_max == IterationLimit::Max(0) {
            return Err(ConfigError::Invalid(
                "validation_max must be at least 1 or unlimited".into(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".into()));
        }
        Ok(())
    }
}
