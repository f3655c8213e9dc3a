use crate::loading::LoadingPolicy;
use crate::pipeline::LoadOrder;
use serde::{Deserialize, Serialize};
use showcase_assets::{DEFAULT_RUNTIME, TextOptions};
use showcase_common::Rgb;
use showcase_input::{MouseBindings, OrbitLimits};
use showcase_render::{ContactCard, RendererSettings};
use showcase_scene::AmbientLight;
use std::path::{Path, PathBuf};

/// Errors from reading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Asset locations relative to `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    pub root: PathBuf,
    pub environment: String,
    pub model: String,
    pub font: String,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets"),
            environment: "environment.hdr".into(),
            model: "model-transformed.glb".into(),
            font: "helvetiker_regular.typeface.json".into(),
        }
    }
}

/// How Draco-compressed primitives are decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CodecConfig {
    /// Run the decoder bundle found at `decoder_path` with `runtime`.
    Bundle {
        #[serde(default = "default_runtime")]
        runtime: String,
    },
    /// External decoder as `[program, args...]` with `{input}`, `{output}`
    /// and `{attributes}` placeholders.
    Command { command: Vec<String> },
    /// Compressed models fail to load.
    Disabled,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig::Bundle {
            runtime: default_runtime(),
        }
    }
}

fn default_runtime() -> String {
    DEFAULT_RUNTIME.into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    /// URL or directory holding the Draco decoder bundle.
    pub decoder_path: String,
    pub codec: CodecConfig,
    pub env_map_intensity: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "Base Model".into(),
            decoder_path: "https://www.gstatic.com/draco/v1/decoders/".into(),
            codec: CodecConfig::default(),
            env_map_intensity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub name: String,
    pub content: String,
    pub options: TextOptions,
    pub color: Rgb,
    /// Stored clamped to `[0, 1]` on the material.
    pub roughness: f32,
    pub metalness: f32,
    pub wireframe: bool,
    pub position: [f32; 3],
    pub rotation_y_degrees: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            name: "InfoText".into(),
            content: "@identicals_ff".into(),
            options: TextOptions::default(),
            color: Rgb::from_hex(0xa4eeea),
            roughness: 2.0,
            metalness: 1.0,
            wireframe: true,
            position: [-14.0, 5.3, 0.7],
            rotation_y_degrees: -320.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
            position: [0.0, 10.0, 20.0],
            target: [0.0; 3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitConfig {
    pub limits: OrbitLimits,
    pub bindings: MouseBindings,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_pan: bool,
}

impl Default for OrbitConfig {
    fn default() -> Self {
        Self {
            limits: OrbitLimits::default(),
            bindings: MouseBindings::default(),
            enable_damping: true,
            damping_factor: 0.05,
            enable_pan: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub clear_color: Rgb,
    pub clear_alpha: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let settings = RendererSettings::default();
        Self {
            clear_color: settings.clear_color,
            clear_alpha: settings.clear_alpha,
        }
    }
}

/// Everything a mount needs. Missing YAML keys fall back to these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ShowcaseConfig {
    pub assets: AssetPaths,
    pub model: ModelConfig,
    pub text: TextConfig,
    pub camera: CameraConfig,
    pub orbit: OrbitConfig,
    pub ambient: AmbientLight,
    pub renderer: RendererConfig,
    pub load_order: LoadOrder,
    pub loading_policy: LoadingPolicy,
    pub contact: ContactCard,
}

impl ShowcaseConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            clear_color: self.renderer.clear_color,
            clear_alpha: self.renderer.clear_alpha,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.orbit.limits;
        if !(limits.min_distance > 0.0 && limits.min_distance <= limits.max_distance) {
            return Err(ConfigError::Invalid(format!(
                "distance range [{}, {}] is empty or non-positive",
                limits.min_distance, limits.max_distance
            )));
        }
        if !(0.0..=std::f32::consts::PI).contains(&limits.min_polar_angle)
            || limits.min_polar_angle > limits.max_polar_angle
            || limits.max_polar_angle > std::f32::consts::PI
        {
            return Err(ConfigError::Invalid(format!(
                "polar range [{}, {}] must lie within [0, pi]",
                limits.min_polar_angle, limits.max_polar_angle
            )));
        }
        if !(0.0..=1.0).contains(&self.orbit.damping_factor) {
            return Err(ConfigError::Invalid("damping_factor must be in [0, 1]".into()));
        }
        let camera = &self.camera;
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid("camera fov must be in (0, 180)".into()));
        }
        if !(camera.near > 0.0 && camera.near < camera.far) {
            return Err(ConfigError::Invalid("camera needs 0 < near < far".into()));
        }
        if self.text.options.size <= 0.0 || self.text.options.curve_segments == 0 {
            return Err(ConfigError::Invalid(
                "text size and curve segments must be positive".into(),
            ));
        }
        match &self.model.codec {
            CodecConfig::Bundle { runtime } if runtime.trim().is_empty() => {
                return Err(ConfigError::Invalid("codec runtime must not be empty".into()));
            }
            CodecConfig::Command { command } if command.first().is_none_or(|p| p.is_empty()) => {
                return Err(ConfigError::Invalid("codec command needs a program".into()));
            }
            _ => {}
        }
        if self.model.name == self.text.name {
            return Err(ConfigError::Invalid(format!(
                "model and text share the node name {:?}",
                self.model.name
            )));
        }
        Ok(())
    }
}
