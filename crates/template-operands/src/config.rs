//! Operand Configuration
//!
//! Loaded from a mounted YAML file. Every field has a default so a partial file
//! only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

/// Environment variable overriding the template validator image
pub const VALIDATOR_IMAGE_ENV: &str = "VALIDATOR_IMAGE";

pub const DEFAULT_TEMPLATES_VERSION: &str = "v0.16.2";
pub const DEFAULT_TEMPLATES_NAMESPACE: &str = "openshift";
pub const DEFAULT_GOLDEN_IMAGES_NAMESPACE: &str = "kubevirt-os-images";
pub const DEFAULT_BUNDLE_DIR: &str = "data/common-templates-bundle";
pub const DEFAULT_VALIDATOR_IMAGE: &str = "quay.io/kubevirt/kubevirt-template-validator:v0.7.0";

/// Main operand configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandConfig {
    /// Release of the template bundle this build ships
    #[serde(default = "default_version")]
    pub version: String,

    /// Namespace the common templates are deployed into
    #[serde(default = "default_templates_namespace")]
    pub templates_namespace: String,

    /// Namespace holding golden images shared by all users
    #[serde(default = "default_golden_images_namespace")]
    pub golden_images_namespace: String,

    /// Directory containing `common-templates-<version>.yaml`
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,

    #[serde(default)]
    pub template_validator: ValidatorConfig,
}

/// Template validator webhook configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorConfig {
    /// Namespace for the webhook Deployment, Service and ServiceAccount
    #[serde(default = "default_templates_namespace")]
    pub namespace: String,

    #[serde(default = "default_replicas")]
    pub replicas: i32,

    #[serde(default = "default_validator_image")]
    pub image: String,
}

fn default_version() -> String {
    DEFAULT_TEMPLATES_VERSION.to_string()
}

fn default_templates_namespace() -> String {
    DEFAULT_TEMPLATES_NAMESPACE.to_string()
}

fn default_golden_images_namespace() -> String {
    DEFAULT_GOLDEN_IMAGES_NAMESPACE.to_string()
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BUNDLE_DIR)
}

fn default_replicas() -> i32 {
    2
}

fn default_validator_image() -> String {
    DEFAULT_VALIDATOR_IMAGE.to_string()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            namespace: default_templates_namespace(),
            replicas: default_replicas(),
            image: default_validator_image(),
        }
    }
}

impl Default for OperandConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            templates_namespace: default_templates_namespace(),
            golden_images_namespace: default_golden_images_namespace(),
            bundle_dir: default_bundle_dir(),
            template_validator: ValidatorConfig::default(),
        }
    }
}

impl OperandConfig {
    /// Load configuration from a mounted file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::Config(format!("Failed to parse config YAML: {e}")))
    }

    /// Applies environment overrides on top of the file values.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_validator_image(std::env::var(VALIDATOR_IMAGE_ENV).ok())
    }

    fn with_validator_image(mut self, image: Option<String>) -> Self {
        if let Some(image) = image.filter(|i| !i.trim().is_empty()) {
            debug!(image = %image, "Validator image overridden from environment");
            self.template_validator.image = image;
        }
        self
    }

    /// Validate that required fields hold usable values
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::Config("version must not be empty".to_string()));
        }
        // The version ends up in a label selector
        if self.version.len() > 63
            || !self
                .version
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(Error::Config(format!(
                "version '{}' is not a valid label value",
                self.version
            )));
        }
        for (field, value) in [
            ("templatesNamespace", &self.templates_namespace),
            ("goldenImagesNamespace", &self.golden_images_namespace),
            ("templateValidator.namespace", &self.template_validator.namespace),
            ("templateValidator.image", &self.template_validator.image),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} must not be empty")));
            }
        }
        if self.template_validator.replicas < 0 {
            return Err(Error::Config(
                "templateValidator.replicas must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = OperandConfig::from_yaml(
            r"
version: v0.17.0
templatesNamespace: templates
templateValidator:
  replicas: 3
",
        )
        .unwrap();

        assert_eq!(config.version, "v0.17.0");
        assert_eq!(config.templates_namespace, "templates");
        assert_eq!(config.golden_images_namespace, DEFAULT_GOLDEN_IMAGES_NAMESPACE);
        assert_eq!(config.template_validator.replicas, 3);
        assert_eq!(config.template_validator.image, DEFAULT_VALIDATOR_IMAGE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(OperandConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_versions_unusable_in_selectors() {
        let config = OperandConfig {
            version: "v1 beta".to_string(),
            ..OperandConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_empty_namespace() {
        let mut config = OperandConfig::default();
        config.template_validator.namespace = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn image_override_ignores_blank_values() {
        let config = OperandConfig::default()
            .with_validator_image(Some("registry.local/validator:dev".to_string()));
        assert_eq!(config.template_validator.image, "registry.local/validator:dev");

        let config = OperandConfig::default().with_validator_image(Some("  ".to_string()));
        assert_eq!(config.template_validator.image, DEFAULT_VALIDATOR_IMAGE);
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        let err = OperandConfig::from_file(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
