//! Run configuration.
//!
//! Layers, lowest priority first: built-in defaults, a config file (TOML or
//! JSON, picked by extension), `DETECTNET_*` environment variables, and
//! command-line overrides. The merged result is validated once.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::NetworkSettings;
use crate::ingest::SourceOptions;
use crate::overlay::OverlayFlags;
use crate::pipeline::LoopSettings;
use crate::ui::UiMode;

pub const CONFIG_ENV: &str = "DETECTNET_CONFIG";

const DEFAULT_NETWORK: &str = "ssd-mobilenet-v2";
const DEFAULT_THRESHOLD: f32 = 0.5;
const DEFAULT_INPUT_WIDTH: u32 = 1280;
const DEFAULT_INPUT_HEIGHT: u32 = 960;
const DEFAULT_SCALE: f32 = 0.5;
const DEFAULT_MODEL_DIR: &str = "networks";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectConfigFile {
    input: Option<String>,
    output: Option<String>,
    network: Option<NetworkConfigFile>,
    capture: Option<CaptureConfigFile>,
    overlay: Option<String>,
    profile: Option<bool>,
    ui: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct NetworkConfigFile {
    name: Option<String>,
    threshold: Option<f32>,
    model_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    scale: Option<f32>,
    timeout_ms: Option<u64>,
    rate: Option<u32>,
    #[serde(rename = "loop")]
    loop_count: Option<i32>,
    zero_copy: Option<bool>,
}

/// Values supplied on the command line. `None` keeps the lower layer.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub input: Option<String>,
    pub output: Option<String>,
    pub network: Option<String>,
    pub overlay: Option<String>,
    pub threshold: Option<f32>,
    pub input_width: Option<u32>,
    pub input_height: Option<u32>,
    pub scale: Option<f32>,
    pub input_timeout_ms: Option<u64>,
    pub input_rate: Option<u32>,
    pub input_loop: Option<i32>,
    pub zero_copy: bool,
    pub model_dir: Option<PathBuf>,
    pub profile: bool,
    pub ui: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DetectConfig {
    pub input: String,
    pub output: String,
    pub network: String,
    pub overlay: OverlayFlags,
    pub threshold: f32,
    pub input_width: u32,
    pub input_height: u32,
    pub scale: f32,
    pub input_timeout: Option<Duration>,
    pub input_rate: Option<u32>,
    pub input_loop: i32,
    pub zero_copy: bool,
    pub model_dir: PathBuf,
    pub profile: bool,
    pub ui: UiMode,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: String::new(),
            network: DEFAULT_NETWORK.to_string(),
            overlay: OverlayFlags::ALL,
            threshold: DEFAULT_THRESHOLD,
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            scale: DEFAULT_SCALE,
            input_timeout: None,
            input_rate: None,
            input_loop: 0,
            zero_copy: false,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            profile: false,
            ui: UiMode::Auto,
        }
    }
}

impl DetectConfig {
    /// Merge all layers. `config_path` wins over `DETECTNET_CONFIG`.
    pub fn load(config_path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_config_file(&path)?,
            None => DetectConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectConfigFile) -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(input) = file.input {
            cfg.input = input;
        }
        if let Some(output) = file.output {
            cfg.output = output;
        }
        if let Some(overlay) = file.overlay {
            cfg.overlay = parse_overlay(&overlay)?;
        }
        if let Some(profile) = file.profile {
            cfg.profile = profile;
        }
        if let Some(ui) = file.ui {
            cfg.ui = ui.parse()?;
        }
        if let Some(network) = file.network {
            if let Some(name) = network.name {
                cfg.network = name;
            }
            if let Some(threshold) = network.threshold {
                cfg.threshold = threshold;
            }
            if let Some(model_dir) = network.model_dir {
                cfg.model_dir = model_dir;
            }
        }
        if let Some(capture) = file.capture {
            cfg.input_width = capture.width.unwrap_or(cfg.input_width);
            cfg.input_height = capture.height.unwrap_or(cfg.input_height);
            cfg.scale = capture.scale.unwrap_or(cfg.scale);
            cfg.input_timeout = capture.timeout_ms.map(Duration::from_millis);
            cfg.input_rate = capture.rate;
            cfg.input_loop = capture.loop_count.unwrap_or(cfg.input_loop);
            cfg.zero_copy = capture.zero_copy.unwrap_or(cfg.zero_copy);
        }
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(input) = env_value("DETECTNET_INPUT") {
            self.input = input;
        }
        if let Some(output) = env_value("DETECTNET_OUTPUT") {
            self.output = output;
        }
        if let Some(network) = env_value("DETECTNET_NETWORK") {
            self.network = network;
        }
        if let Some(overlay) = env_value("DETECTNET_OVERLAY") {
            self.overlay = parse_overlay(&overlay)?;
        }
        if let Some(threshold) = env_value("DETECTNET_THRESHOLD") {
            self.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("DETECTNET_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Some(model_dir) = env_value("DETECTNET_MODEL_DIR") {
            self.model_dir = PathBuf::from(model_dir);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(input) = &overrides.input {
            self.input = input.clone();
        }
        if let Some(output) = &overrides.output {
            self.output = output.clone();
        }
        if let Some(network) = &overrides.network {
            self.network = network.clone();
        }
        if let Some(overlay) = &overrides.overlay {
            self.overlay = parse_overlay(overlay)?;
        }
        if let Some(ui) = &overrides.ui {
            self.ui = ui.parse()?;
        }
        self.threshold = overrides.threshold.unwrap_or(self.threshold);
        self.input_width = overrides.input_width.unwrap_or(self.input_width);
        self.input_height = overrides.input_height.unwrap_or(self.input_height);
        self.scale = overrides.scale.unwrap_or(self.scale);
        if let Some(ms) = overrides.input_timeout_ms {
            self.input_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(rate) = overrides.input_rate {
            self.input_rate = Some(rate);
        }
        self.input_loop = overrides.input_loop.unwrap_or(self.input_loop);
        if let Some(model_dir) = &overrides.model_dir {
            self.model_dir = model_dir.clone();
        }
        self.zero_copy |= overrides.zero_copy;
        self.profile |= overrides.profile;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(anyhow!(
                "threshold must be between 0 and 1 (got {})",
                self.threshold
            ));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(anyhow!(
                "input resolution must be non-zero (got {}x{})",
                self.input_width,
                self.input_height
            ));
        }
        if !(self.scale > 0.0 && self.scale <= 1.0) {
            return Err(anyhow!("scale must be in (0, 1] (got {})", self.scale));
        }
        if self.network.trim().is_empty() {
            return Err(anyhow!("network name must not be empty"));
        }
        if self.input_loop < -1 {
            return Err(anyhow!(
                "input loop count must be -1 (forever) or >= 0 (got {})",
                self.input_loop
            ));
        }
        Ok(())
    }

    pub fn network_settings(&self) -> NetworkSettings {
        NetworkSettings {
            model_dir: self.model_dir.clone(),
            threshold: self.threshold,
        }
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            width: Some(self.input_width),
            height: Some(self.input_height),
            timeout: self.input_timeout,
            frame_rate: self.input_rate,
            loop_count: self.input_loop,
            zero_copy: self.zero_copy,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            overlay: self.overlay,
            input_width: self.input_width,
            input_height: self.input_height,
            scale: self.scale,
            profile: self.profile,
        }
    }
}

fn parse_overlay(value: &str) -> Result<OverlayFlags> {
    value
        .parse()
        .with_context(|| format!("invalid overlay '{}'", value))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<DetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() -> Result<()> {
        let cfg = DetectConfig::default();
        cfg.validate()?;
        assert_eq!(cfg.network, "ssd-mobilenet-v2");
        assert_eq!(cfg.overlay, OverlayFlags::ALL);
        assert_eq!(cfg.loop_settings().scratch_spec().width, 640);
        Ok(())
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let mut cfg = DetectConfig {
            threshold: 1.5,
            ..DetectConfig::default()
        };
        assert!(cfg.validate().is_err());
        cfg.threshold = 0.5;
        cfg.scale = 0.0;
        assert!(cfg.validate().is_err());
        cfg.scale = 1.0;
        cfg.input_height = 0;
        assert!(cfg.validate().is_err());
        cfg.input_height = 10;
        cfg.input_loop = -2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overrides_replace_lower_layers() -> Result<()> {
        let mut cfg = DetectConfig::default();
        cfg.apply_overrides(&ConfigOverrides {
            overlay: Some("box,conf".to_string()),
            input_timeout_ms: Some(250),
            input_loop: Some(-1),
            zero_copy: true,
            profile: true,
            ..ConfigOverrides::default()
        })?;
        assert!(cfg.overlay.boxes && cfg.overlay.confidence && !cfg.overlay.labels);
        assert_eq!(cfg.input_timeout, Some(Duration::from_millis(250)));
        assert_eq!(cfg.source_options().loop_count, -1);
        assert!(cfg.source_options().zero_copy);
        assert!(cfg.profile);
        Ok(())
    }

    #[test]
    fn bad_overlay_override_fails() {
        let mut cfg = DetectConfig::default();
        let result = cfg.apply_overrides(&ConfigOverrides {
            overlay: Some("boxes".to_string()),
            ..ConfigOverrides::default()
        });
        assert!(result.is_err());
    }
}
