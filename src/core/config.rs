use crate::core::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scraping::discovery::{DiscoveryPolicy, RenderPolicy};

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (config.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "LISTING_SCOUT_CONFIG";
pub const ENV_STATE_PATH: &str = "LISTING_SCOUT_STATE";
pub const ENV_OUTPUT_DIR: &str = "LISTING_SCOUT_OUTPUT_DIR";
pub const ENV_CHROME_WS_URL: &str = "CHROME_WS_URL";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Documented bounds for one editable timing field.
#[derive(Debug, Clone, Copy)]
pub struct FieldLimit {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

/// Editable timing fields in form order: (min field, max field) pairs share a limit.
pub const TIMING_LIMITS: [(FieldLimit, FieldLimit); 3] = [
    (
        FieldLimit { field: "page_scan_min_secs", min: 0.0, max: 300.0 },
        FieldLimit { field: "page_scan_max_secs", min: 0.5, max: 600.0 },
    ),
    (
        FieldLimit { field: "review_min_secs", min: 0.0, max: 300.0 },
        FieldLimit { field: "review_max_secs", min: 0.5, max: 600.0 },
    ),
    (
        FieldLimit { field: "pause_min_secs", min: 0.0, max: 120.0 },
        FieldLimit { field: "pause_max_secs", min: 0.5, max: 300.0 },
    ),
];

/// Human-pacing ranges, all in seconds.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Time spent "reading" the result list after discovery.
    pub page_scan_min_secs: f64,
    pub page_scan_max_secs: f64,
    /// Time spent on one item's detail view before moving on.
    pub review_min_secs: f64,
    pub review_max_secs: f64,
    /// Pause between two items.
    pub pause_min_secs: f64,
    pub pause_max_secs: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            page_scan_min_secs: 3.0,
            page_scan_max_secs: 8.0,
            review_min_secs: 4.0,
            review_max_secs: 12.0,
            pause_min_secs: 2.0,
            pause_max_secs: 6.0,
        }
    }
}

impl TimingConfig {
    fn field(&self, name: &str) -> Option<f64> {
        Some(match name {
            "page_scan_min_secs" => self.page_scan_min_secs,
            "page_scan_max_secs" => self.page_scan_max_secs,
            "review_min_secs" => self.review_min_secs,
            "review_max_secs" => self.review_max_secs,
            "pause_min_secs" => self.pause_min_secs,
            "pause_max_secs" => self.pause_max_secs,
            _ => return None,
        })
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        Some(match name {
            "page_scan_min_secs" => &mut self.page_scan_min_secs,
            "page_scan_max_secs" => &mut self.page_scan_max_secs,
            "review_min_secs" => &mut self.review_min_secs,
            "review_max_secs" => &mut self.review_max_secs,
            "pause_min_secs" => &mut self.pause_min_secs,
            "pause_max_secs" => &mut self.pause_max_secs,
            _ => return None,
        })
    }

    /// Range check every field, then require each max to exceed its min.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (lo, hi) in TIMING_LIMITS {
            for limit in [lo, hi] {
                let value = self.field(limit.field).unwrap_or_default();
                if !value.is_finite() || value < limit.min || value > limit.max {
                    return Err(ConfigError::OutOfRange {
                        field: limit.field,
                        value,
                        min: limit.min,
                        max: limit.max,
                    });
                }
            }
            let min_v = self.field(lo.field).unwrap_or_default();
            let max_v = self.field(hi.field).unwrap_or_default();
            if max_v <= min_v {
                return Err(ConfigError::MaxNotGreater {
                    min_field: lo.field,
                    max_field: hi.field,
                });
            }
        }
        Ok(())
    }

    /// Apply one form edit. The config is left untouched when the result
    /// would not validate.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let value: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
        })?;
        let mut candidate = self.clone();
        let slot = candidate
            .field_mut(key)
            .ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;
        *slot = value;
        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

/// Polling ceilings. Tuned against one host's rendering; exposed so they can be
/// adjusted without a rebuild.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub discovery_interval_ms: u64,
    pub discovery_stable_polls: u32,
    pub discovery_max_polls: u32,
    pub render_attempts: u32,
    pub render_delay_ms: u64,
    pub detail_attempts: u32,
    pub detail_interval_ms: u64,
    /// Delay before returning to idle once a run has finished.
    pub settle_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 500,
            discovery_stable_polls: 3,
            discovery_max_polls: 20,
            render_attempts: 10,
            render_delay_ms: 300,
            detail_attempts: 40,
            detail_interval_ms: 250,
            settle_delay_ms: 2000,
        }
    }
}

impl PollingConfig {
    pub fn discovery_policy(&self) -> DiscoveryPolicy {
        DiscoveryPolicy {
            poll_interval: Duration::from_millis(self.discovery_interval_ms),
            stable_polls: self.discovery_stable_polls.max(1),
            max_polls: self.discovery_max_polls.max(1),
        }
    }

    pub fn render_policy(&self) -> RenderPolicy {
        RenderPolicy {
            attempts: self.render_attempts.max(1),
            delay: Duration::from_millis(self.render_delay_ms),
        }
    }

    pub fn detail_interval(&self) -> Duration {
        Duration::from_millis(self.detail_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Set one field from its string form. Attempt and poll counts must be at
    /// least one; intervals may be zero.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: format!("polling.{}", key),
            value: raw.to_string(),
        };
        let millis = || raw.trim().parse::<u64>().map_err(|_| invalid());
        let count = |field: &'static str| -> Result<u32, ConfigError> {
            let n: u32 = raw.trim().parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    value: 0.0,
                    min: 1.0,
                    max: u32::MAX as f64,
                });
            }
            Ok(n)
        };
        match key {
            "discovery_interval_ms" => self.discovery_interval_ms = millis()?,
            "discovery_stable_polls" => self.discovery_stable_polls = count("discovery_stable_polls")?,
            "discovery_max_polls" => self.discovery_max_polls = count("discovery_max_polls")?,
            "render_attempts" => self.render_attempts = count("render_attempts")?,
            "render_delay_ms" => self.render_delay_ms = millis()?,
            "detail_attempts" => self.detail_attempts = count("detail_attempts")?,
            "detail_interval_ms" => self.detail_interval_ms = millis()?,
            "settle_delay_ms" => self.settle_delay_ms = millis()?,
            _ => return Err(ConfigError::UnknownKey(format!("polling.{}", key))),
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorMode {
    /// Every item is kept.
    #[default]
    Off,
    /// keep / reject on the summary only.
    Binary,
    /// reject / keep / defer on the summary, with one detail re-check after defer.
    ThreeTier,
}

/// Evaluator sub-config (mirrors the `evaluator` key in config.json).
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub mode: EvaluatorMode,
    /// What the user is looking for. Sent as the system prompt.
    pub criteria: Option<String>,
    /// LLM endpoint, e.g. `https://api.openai.com/v1` or `http://localhost:11434/v1` (Ollama).
    pub llm_base_url: Option<String>,
    /// API key. Never logged. Leave blank for key-less local endpoints.
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    /// Max characters of item text sent per evaluation. Default: 6000.
    pub max_chars: Option<usize>,
    /// Request timeout in seconds. Default: 60.
    pub timeout_secs: Option<u64>,
}

impl EvaluatorConfig {
    /// API key: JSON field → `OPENAI_API_KEY` env var → `None`.
    ///
    /// An explicit empty string means "no key required" (local endpoint).
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.llm_api_key {
            return Some(k.trim().to_string());
        }
        std::env::var("OPENAI_API_KEY").ok().filter(|v| !v.trim().is_empty())
    }

    /// LLM base URL: JSON field → `OPENAI_BASE_URL` env var → `https://api.openai.com/v1`.
    pub fn resolve_base_url(&self) -> String {
        if let Some(u) = &self.llm_base_url {
            if !u.trim().is_empty() {
                return u.clone();
            }
        }
        std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
    }

    /// Model name: JSON field → `LISTING_SCOUT_LLM_MODEL` env var → `gpt-4o-mini`.
    pub fn resolve_model(&self) -> String {
        if let Some(m) = &self.llm_model {
            if !m.trim().is_empty() {
                return m.clone();
            }
        }
        std::env::var("LISTING_SCOUT_LLM_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "gpt-4o-mini".to_string())
    }

    pub fn resolve_max_chars(&self) -> usize {
        self.max_chars.unwrap_or(6000)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(60))
    }
}

/// How to reach the browser.
#[derive(Serialize, Deserialize, Default, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BrowserSection {
    /// DevTools websocket of an already running browser. Wins over launching.
    pub ws_url: Option<String>,
    /// Profile directory for a launched browser, so a manual login persists.
    pub profile_dir: Option<String>,
    pub headless: bool,
}

impl BrowserSection {
    /// Websocket URL: JSON field → `CHROME_WS_URL` env var → `None` (launch).
    pub fn resolve_ws_url(&self) -> Option<String> {
        if let Some(u) = &self.ws_url {
            if !u.trim().is_empty() {
                return Some(u.trim().to_string());
            }
        }
        std::env::var(ENV_CHROME_WS_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Profile dir: JSON field → `~/.listing-scout/profile`.
    pub fn resolve_profile_dir(&self) -> Option<PathBuf> {
        if let Some(p) = &self.profile_dir {
            if !p.trim().is_empty() {
                return Some(PathBuf::from(p.trim()));
            }
        }
        scout_home().map(|h| h.join("profile"))
    }
}

/// Top-level config loaded from `config.json`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScoutConfig {
    pub timing: TimingConfig,
    pub polling: PollingConfig,
    pub evaluator: EvaluatorConfig,
    pub browser: BrowserSection,
    /// Skip items the host already marks as viewed / applied.
    pub skip_seen: bool,
    pub output_dir: Option<String>,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            polling: PollingConfig::default(),
            evaluator: EvaluatorConfig::default(),
            browser: BrowserSection::default(),
            skip_seen: true,
            output_dir: None,
        }
    }
}

impl ScoutConfig {
    /// Output directory: JSON field → `LISTING_SCOUT_OUTPUT_DIR` → cwd.
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(d) = &self.output_dir {
            if !d.trim().is_empty() {
                return PathBuf::from(d.trim());
            }
        }
        std::env::var(ENV_OUTPUT_DIR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Edit one key from the command line (`timing.*`, `polling.*`,
    /// `skip_seen`, `evaluator.mode`, `output_dir`).
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            k if k.starts_with("timing.") => self.timing.set(&k["timing.".len()..], value),
            k if k.starts_with("polling.") => self.polling.set(&k["polling.".len()..], value),
            "skip_seen" => {
                self.skip_seen = value.trim().parse().map_err(|_| invalid())?;
                Ok(())
            }
            "evaluator.mode" => {
                self.evaluator.mode = match value.trim() {
                    "off" => EvaluatorMode::Off,
                    "binary" => EvaluatorMode::Binary,
                    "three_tier" | "triage" => EvaluatorMode::ThreeTier,
                    _ => return Err(invalid()),
                };
                Ok(())
            }
            "evaluator.criteria" => {
                self.evaluator.criteria = Some(value.to_string()).filter(|v| !v.trim().is_empty());
                Ok(())
            }
            "output_dir" => {
                self.output_dir = Some(value.to_string()).filter(|v| !v.trim().is_empty());
                Ok(())
            }
            other => Err(ConfigError::UnknownKey(other.to_string())),
        }
    }
}

/// `~/.listing-scout`
pub fn scout_home() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".listing-scout"))
}

/// Where `config.json` lives: `LISTING_SCOUT_CONFIG` → `~/.listing-scout/config.json`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p.trim()));
        }
    }
    scout_home().map(|h| h.join("config.json"))
}

/// Where the session state lives: `LISTING_SCOUT_STATE` → `~/.listing-scout/session.json`.
pub fn state_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(ENV_STATE_PATH) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p.trim()));
        }
    }
    scout_home().map(|h| h.join("session.json"))
}

/// Load config from `path`.
///
/// Missing file → defaults (silent). Parse error or invalid timing → log a
/// warning and use defaults for the broken part.
pub fn load_config_from(path: &Path) -> ScoutConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return ScoutConfig::default(),
    };
    match serde_json::from_str::<ScoutConfig>(&contents) {
        Ok(mut cfg) => {
            if let Err(e) = cfg.timing.validate() {
                tracing::warn!(
                    "config: timing in {} rejected ({}), using default timing",
                    path.display(),
                    e
                );
                cfg.timing = TimingConfig::default();
            }
            tracing::info!("config: loaded from {}", path.display());
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "config: parse error at {}: {}, using defaults",
                path.display(),
                e
            );
            ScoutConfig::default()
        }
    }
}

pub fn load_config() -> ScoutConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => ScoutConfig::default(),
    }
}

/// Persist config atomically (write temp, then rename).
pub fn save_config_to(path: &Path, cfg: &ScoutConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

pub fn save_config(cfg: &ScoutConfig) -> std::io::Result<()> {
    let path = config_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "cannot locate home directory")
    })?;
    save_config_to(&path, cfg)
}
