//! Renderer and scene configuration, loadable from TOML.
//!
//! All fields use `serde(default)` so partial files work.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::render::MAX_SUPPORTED_INSTANCES;

/// Settings for [`SpriteScene`](crate::SpriteScene) and the renderer it owns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Capacity of each per-instance buffer.
    pub max_instances: usize,
    /// Grid cells along the longer side of the viewport.
    pub instances_per_side: u32,
    /// Upper bound on each instance's spin, in radians per second.
    pub max_rotation_speed: f32,
    /// RGBA clear color, each channel in `[0, 1]`.
    pub clear_color: [f32; 4],
    /// Seed for the per-instance angles and speeds. Random when unset.
    pub seed: Option<u64>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_instances: 16 * 16,
            instances_per_side: 16,
            max_rotation_speed: 0.3 * std::f32::consts::TAU,
            clear_color: [0.2, 0.2, 0.3, 1.0],
            seed: None,
        }
    }
}

impl RendererConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ParseError`] for malformed TOML,
    /// [`ConfigError::ValidationError`] if [`validate`](Self::validate) fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::FileNotFound`] if `path` does not exist, otherwise as
    /// for [`from_toml_str`](Self::from_toml_str).
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Check every field, collecting all violations into one error.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] listing each violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.max_instances == 0 {
            errors.push("max_instances must be at least 1".into());
        }
        if self.max_instances > MAX_SUPPORTED_INSTANCES {
            errors.push(format!(
                "max_instances must be at most {MAX_SUPPORTED_INSTANCES}, got {}",
                self.max_instances
            ));
        }
        if self.instances_per_side == 0 {
            errors.push("instances_per_side must be at least 1".into());
        }
        let grid = u64::from(self.instances_per_side).pow(2);
        if grid > self.max_instances as u64 {
            errors.push(format!(
                "instances_per_side² ({grid}) exceeds max_instances ({})",
                self.max_instances
            ));
        }
        if !self.max_rotation_speed.is_finite() || self.max_rotation_speed < 0.0 {
            errors.push(format!(
                "max_rotation_speed must be finite and non-negative, got {}",
                self.max_rotation_speed
            ));
        }
        for (channel, value) in ["r", "g", "b", "a"].iter().zip(self.clear_color) {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!(
                    "clear_color.{channel} must be between 0 and 1, got {value}"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RendererConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str("instances_per_side = 8\nseed = 42\n").unwrap();
        assert_eq!(config.instances_per_side, 8);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.max_instances, 256);
        assert_eq!(config.clear_color, [0.2, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn grid_larger_than_capacity_is_rejected() {
        let err = RendererConfig::from_toml_str("max_instances = 10\ninstances_per_side = 4\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref msg) if msg.contains("(16)")));
    }

    #[test]
    fn all_violations_are_reported() {
        let config = RendererConfig {
            max_instances: 0,
            instances_per_side: 0,
            max_rotation_speed: f32::NAN,
            clear_color: [1.5, 0.0, 0.0, -1.0],
            seed: None,
        };
        let ConfigError::ValidationError(msg) = config.validate().unwrap_err() else {
            panic!("expected a validation error");
        };
        assert!(msg.contains("max_instances must be at least 1"));
        assert!(msg.contains("instances_per_side"));
        assert!(msg.contains("max_rotation_speed"));
        assert!(msg.contains("clear_color.r"));
        assert!(msg.contains("clear_color.a"));
        assert!(!msg.contains("clear_color.g"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = RendererConfig::from_toml_str("max_instances = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let path = Path::new("/nonexistent/sprites.toml");
        assert!(matches!(
            RendererConfig::load_from_path(path),
            Err(ConfigError::FileNotFound(p)) if p == path
        ));
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprites.toml");
        std::fs::write(&path, "max_instances = 64\ninstances_per_side = 8\n").unwrap();
        let config = RendererConfig::load_from_path(&path).unwrap();
        assert_eq!(config.max_instances, 64);
        assert_eq!(config.instances_per_side, 8);
    }
}
