//! Engine configuration stored in a TOML file (default `reasoner.toml`).

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::budget::ModelLimits;
use crate::core::types::ReasoningSystemDescriptor;
use crate::core::window::MAX_PREVIOUS_STEPS;

/// Engine configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the values
/// the engine ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub resources: ResourceSettings,
    pub gateway: GatewaySettings,
    pub models: Vec<ModelEntry>,
    pub reasoning_systems: Vec<ReasoningSystemDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Step limit when the caller does not pass one.
    pub max_steps_default: usize,
    /// Previous steps carried into each prompt (first step included).
    pub max_previous_steps: usize,
    /// Generation ceiling sent with every gateway query.
    pub max_tokens_per_step: usize,
    pub temperature: f64,
    /// Token budget when optimization is off or the model is unknown.
    pub fallback_token_budget: usize,
    /// Wall-clock budget for one run, in milliseconds.
    pub time_budget_ms: u64,
    /// Prompt size limit before droppable sections are removed.
    pub prompt_budget_bytes: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps_default: 10,
            max_previous_steps: MAX_PREVIOUS_STEPS,
            max_tokens_per_step: 1000,
            temperature: 0.7,
            fallback_token_budget: 8192,
            time_budget_ms: 120_000,
            prompt_budget_bytes: 24_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ResourceSettings {
    /// Independent lines of work the host can run at once.
    pub parallel_capacity: usize,
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            parallel_capacity: std::thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewaySettings {
    /// Command that answers one gateway request (JSON on stdin, JSON on stdout).
    pub command: Vec<String>,
    /// Truncate gateway stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            command: vec!["reasoner-gateway".to_string()],
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Token limits for a model name prefix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelEntry {
    pub name: String,
    pub context_window: usize,
    pub max_output: usize,
}

impl ModelEntry {
    fn new(name: &str, context_window: usize, max_output: usize) -> Self {
        Self {
            name: name.to_string(),
            context_window,
            max_output,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            resources: ResourceSettings::default(),
            gateway: GatewaySettings::default(),
            models: vec![
                ModelEntry::new("claude", 200_000, 64_000),
                ModelEntry::new("gpt-4o", 128_000, 16_384),
                ModelEntry::new("gpt-4", 8_192, 4_096),
                ModelEntry::new("gemini", 1_000_000, 65_536),
            ],
            reasoning_systems: vec![
                ReasoningSystemDescriptor::new(
                    "chain_of_thought",
                    "Sequential step-by-step reasoning through a structured chain",
                    "chain_of_thought",
                ),
                ReasoningSystemDescriptor::new(
                    "tree_of_thoughts",
                    "Explores and compares multiple branches before committing",
                    "tree_of_thoughts",
                ),
                ReasoningSystemDescriptor::new(
                    "parallel_exploration",
                    "Develops independent lines of analysis in parallel",
                    "parallel_exploration",
                ),
                ReasoningSystemDescriptor::new(
                    "concise_reasoning",
                    "Direct, token efficient and fast reasoning for simple problems",
                    "concise_reasoning",
                ),
            ],
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.max_steps_default == 0 {
            return Err(anyhow!("engine.max_steps_default must be > 0"));
        }
        if engine.max_previous_steps == 0 {
            return Err(anyhow!("engine.max_previous_steps must be > 0"));
        }
        if engine.max_tokens_per_step == 0 {
            return Err(anyhow!("engine.max_tokens_per_step must be > 0"));
        }
        if !(0.0..=2.0).contains(&engine.temperature) {
            return Err(anyhow!("engine.temperature must be within [0, 2]"));
        }
        if engine.fallback_token_budget == 0 {
            return Err(anyhow!("engine.fallback_token_budget must be > 0"));
        }
        if engine.time_budget_ms == 0 {
            return Err(anyhow!("engine.time_budget_ms must be > 0"));
        }
        if engine.prompt_budget_bytes == 0 {
            return Err(anyhow!("engine.prompt_budget_bytes must be > 0"));
        }
        if self.resources.parallel_capacity == 0 {
            return Err(anyhow!("resources.parallel_capacity must be > 0"));
        }
        if self.gateway.command.is_empty() || self.gateway.command[0].trim().is_empty() {
            return Err(anyhow!("gateway.command must be a non-empty array"));
        }
        if self.gateway.output_limit_bytes == 0 {
            return Err(anyhow!("gateway.output_limit_bytes must be > 0"));
        }
        for model in &self.models {
            if model.name.trim().is_empty() || model.context_window == 0 {
                return Err(anyhow!(
                    "models entries need a name and a context_window > 0"
                ));
            }
        }
        let mut seen = HashSet::new();
        for system in &self.reasoning_systems {
            if system.name.trim().is_empty() {
                return Err(anyhow!("reasoning_systems entries need a name"));
            }
            if !seen.insert(system.name.as_str()) {
                return Err(anyhow!("duplicate reasoning system '{}'", system.name));
            }
        }
        Ok(())
    }

    /// Limits for `model`, matched by the longest configured name prefix.
    pub fn model_limits(&self, model: &str) -> Option<ModelLimits> {
        let model = model.to_lowercase();
        self.models
            .iter()
            .filter(|entry| model.starts_with(&entry.name.to_lowercase()))
            .max_by_key(|entry| entry.name.len())
            .map(|entry| ModelLimits {
                context_window: entry.context_window,
                max_output: entry.max_output,
            })
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
