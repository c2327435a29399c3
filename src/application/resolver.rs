//! Configuration resolution across four sources.
//!
//! Precedence (highest to lowest): explicit overrides, environment
//! variables, configuration file, built-in defaults. Scalar keys shadow
//! fully; nested sections (`intercom.*`, `export.*`, `retry.*`) merge
//! per-key so a file supplying only `intercom.api_token` keeps the
//! `base_url` default. Environment values are coerced to their declared
//! types; a value that cannot be coerced is a configuration error naming
//! the offending key and source.

use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::config::{
    DEFAULT_API_VERSION, DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_URL, DEFAULT_BATCH_SIZE,
    DEFAULT_INITIAL_BACKOFF_SECS, DEFAULT_MAX_BACKOFF_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_OUTPUT_DIR,
};
use crate::domain::{
    AppError, Config, ExportConfig, IntercomConfig, OutputFormat, Result, RetryConfig,
};

/// One partial configuration source. Every field is optional; absent keys
/// fall through to the next source down.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub intercom: IntercomLayer,
    pub export: ExportLayer,
    pub retry: RetryLayer,
    pub debug: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntercomLayer {
    pub api_token: Option<String>,
    pub base_url: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportLayer {
    pub output_format: Option<OutputFormat>,
    pub output_dir: Option<String>,
    pub batch_size: Option<u32>,
    pub include_metadata: Option<bool>,
    pub include_context: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryLayer {
    pub max_retries: Option<u32>,
    pub initial_backoff_seconds: Option<f64>,
    pub backoff_factor: Option<f64>,
    pub max_backoff_seconds: Option<f64>,
}

impl ConfigLayer {
    /// Build a layer from an environment-variable map, coercing known
    /// numeric and boolean keys.
    ///
    /// # Errors
    /// Returns a configuration error naming the key when a value cannot be
    /// coerced to its declared type.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| env.get(key).map(String::as_str);

        Ok(Self {
            intercom: IntercomLayer {
                api_token: get("INTERCOM_API_TOKEN").map(ToString::to_string),
                base_url: get("INTERCOM_BASE_URL").map(ToString::to_string),
                api_version: get("INTERCOM_API_VERSION").map(ToString::to_string),
            },
            export: ExportLayer {
                output_format: get("EXPORT_FORMAT")
                    .map(|v| coerce_format("EXPORT_FORMAT", v))
                    .transpose()?,
                output_dir: get("EXPORT_DIR").map(ToString::to_string),
                batch_size: get("BATCH_SIZE")
                    .map(|v| coerce_int("BATCH_SIZE", v))
                    .transpose()?,
                include_metadata: get("INCLUDE_METADATA")
                    .map(|v| coerce_bool("INCLUDE_METADATA", v))
                    .transpose()?,
                include_context: get("INCLUDE_CONTEXT")
                    .map(|v| coerce_bool("INCLUDE_CONTEXT", v))
                    .transpose()?,
            },
            retry: RetryLayer::default(),
            debug: get("DEBUG").map(|v| coerce_bool("DEBUG", v)).transpose()?,
        })
    }

    /// Apply this layer on top of `base`, key by key. Nested sections merge
    /// per-key, never as whole-object replacement.
    #[must_use]
    pub fn merged_over(self, base: Self) -> Self {
        Self {
            intercom: IntercomLayer {
                api_token: self.intercom.api_token.or(base.intercom.api_token),
                base_url: self.intercom.base_url.or(base.intercom.base_url),
                api_version: self.intercom.api_version.or(base.intercom.api_version),
            },
            export: ExportLayer {
                output_format: self.export.output_format.or(base.export.output_format),
                output_dir: self.export.output_dir.or(base.export.output_dir),
                batch_size: self.export.batch_size.or(base.export.batch_size),
                include_metadata: self
                    .export
                    .include_metadata
                    .or(base.export.include_metadata),
                include_context: self.export.include_context.or(base.export.include_context),
            },
            retry: RetryLayer {
                max_retries: self.retry.max_retries.or(base.retry.max_retries),
                initial_backoff_seconds: self
                    .retry
                    .initial_backoff_seconds
                    .or(base.retry.initial_backoff_seconds),
                backoff_factor: self.retry.backoff_factor.or(base.retry.backoff_factor),
                max_backoff_seconds: self
                    .retry
                    .max_backoff_seconds
                    .or(base.retry.max_backoff_seconds),
            },
            debug: self.debug.or(base.debug),
        }
    }
}

/// Merge the three explicit sources over the built-in defaults and produce
/// the final immutable configuration.
///
/// # Errors
/// Returns a configuration error when `intercom.api_token` is absent or a
/// resolved value violates its declared bounds.
pub fn resolve(
    file: ConfigLayer,
    env: &HashMap<String, String>,
    overrides: ConfigLayer,
) -> Result<Config> {
    let env_layer = ConfigLayer::from_env(env)?;
    let layer = overrides.merged_over(env_layer.merged_over(file));

    let api_token = layer
        .intercom
        .api_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Config {
            message: "intercom.api_token is required; set INTERCOM_API_TOKEN or add it to the config file".to_string(),
        })?;

    let batch_size = layer.export.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if batch_size == 0 {
        return Err(AppError::Config {
            message: "export.batch_size must be greater than zero".to_string(),
        });
    }

    let retry = RetryConfig {
        max_retries: layer.retry.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        initial_backoff_seconds: layer
            .retry
            .initial_backoff_seconds
            .unwrap_or(DEFAULT_INITIAL_BACKOFF_SECS),
        backoff_factor: layer.retry.backoff_factor.unwrap_or(DEFAULT_BACKOFF_FACTOR),
        max_backoff_seconds: layer
            .retry
            .max_backoff_seconds
            .unwrap_or(DEFAULT_MAX_BACKOFF_SECS),
    };
    if retry.initial_backoff_seconds <= 0.0 {
        return Err(AppError::Config {
            message: "retry.initial_backoff_seconds must be greater than zero".to_string(),
        });
    }
    if retry.backoff_factor < 1.0 {
        return Err(AppError::Config {
            message: "retry.backoff_factor must be at least 1".to_string(),
        });
    }

    Ok(Config {
        intercom: IntercomConfig {
            api_token,
            base_url: layer
                .intercom
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_version: layer
                .intercom
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        },
        export: ExportConfig {
            output_format: layer.export.output_format.unwrap_or_default(),
            output_dir: layer
                .export
                .output_dir
                .unwrap_or_else(|| DEFAULT_OUTPUT_DIR.to_string()),
            batch_size,
            include_metadata: layer.export.include_metadata.unwrap_or(true),
            include_context: layer.export.include_context.unwrap_or(true),
        },
        retry,
        debug: layer.debug.unwrap_or(false),
    })
}

/// Fixed string-to-bool mapping for environment values.
fn coerce_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(AppError::Config {
            message: format!("environment variable {key}: cannot interpret '{value}' as a boolean"),
        }),
    }
}

fn coerce_int(key: &str, value: &str) -> Result<u32> {
    value.parse().map_err(|_| AppError::Config {
        message: format!("environment variable {key}: cannot interpret '{value}' as an integer"),
    })
}

fn coerce_format(key: &str, value: &str) -> Result<OutputFormat> {
    value.parse().map_err(|e| AppError::Config {
        message: format!("environment variable {key}: {e}"),
    })
}
