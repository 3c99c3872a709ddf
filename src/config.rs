use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{CrawlError, Result};

/// Which field sequence literal values are paired with when emitting
/// literal-value edges.
///
/// The original graph paired literals with the select list by position, an
/// index-alignment assumption inherited from its query-statement model.
/// `SelectFields` preserves parity with that output; `WhereFields` pairs
/// them with the filter fields the literals are semantically tied to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralPairing {
    #[default]
    SelectFields,
    WhereFields,
}

/// What to do when a class of failure occurs during a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultAction {
    /// Log and continue with the next artifact.
    Skip,
    /// Propagate and terminate the batch.
    Abort,
}

/// Named fault-isolation policy for the batch loop.
///
/// By default parse failures are contained to the artifact being processed
/// while store failures terminate the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultPolicy {
    pub on_parse_error: FaultAction,
    pub on_store_error: FaultAction,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        Self {
            on_parse_error: FaultAction::Skip,
            on_store_error: FaultAction::Abort,
        }
    }
}

/// Configuration for a crawl run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum artifacts in flight. 1 (the default) keeps the original
    /// strictly sequential, backpressure-free contract with the store.
    pub max_in_flight: usize,
    pub literal_pairing: LiteralPairing,
    pub fault_policy: FaultPolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 1,
            literal_pairing: LiteralPairing::default(),
            fault_policy: FaultPolicy::default(),
        }
    }
}

/// Loads a crawler configuration from a JSON file.
pub fn load_config(path: &Path) -> Result<CrawlerConfig> {
    let contents = fs::read_to_string(path).map_err(|e| CrawlError::Config {
        message: format!("failed to read config file '{}': {}", path.display(), e),
    })?;

    serde_json::from_str(&contents).map_err(|e| CrawlError::Config {
        message: format!("failed to parse config file '{}': {}", path.display(), e),
    })
}
