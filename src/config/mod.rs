//! Configuration loading and validation.
//!
//! [`load_file`] reads a config file, picks a deserializer from the file
//! extension via [`parse_config_str`], and runs the
//! [`validation::validate`] pass. The routing tables produced here are
//! fixed for the lifetime of the process.

pub mod model;
pub mod validation;

use std::path::Path;

use crate::error::WaypointError;
use model::Config;
use validation::validate;

/// Parse a config string based on file extension.
pub fn parse_config_str(
    ext: &str,
    content: &str,
    path_display: &str,
) -> Result<Config, WaypointError> {
    match ext {
        #[cfg(feature = "yaml")]
        "yaml" | "yml" => serde_yml::from_str(content).map_err(|e| WaypointError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "json")]
        "json" => serde_json::from_str(content).map_err(|e| WaypointError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        #[cfg(feature = "toml")]
        "toml" => toml::from_str(content).map_err(|e| WaypointError::ConfigParse {
            path: path_display.to_string(),
            source: Box::new(e),
        }),

        other => Err(WaypointError::UnsupportedFormat(other.to_string())),
    }
}

/// Read, parse and validate a config file.
pub async fn load_file(path: &Path) -> Result<Config, WaypointError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WaypointError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            WaypointError::Io(e)
        }
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let config = parse_config_str(ext, &content, &path.display().to_string())?;

    if let Err(errors) = validate(&config) {
        return Err(WaypointError::ConfigValidation { errors });
    }

    Ok(config)
}
