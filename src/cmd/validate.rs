//! `waypoint validate` — check a configuration file for errors.
//!
//! Parses and validates the config file without binding anything, then
//! reports either a human-readable summary or a JSON document.

use std::path::Path;

use serde::Serialize;

use crate::cli::{ValidateArgs, ValidateFormat};
use crate::config::model::Config;
use crate::config::{parse_config_str, validation};
use crate::error::{ValidationError, WaypointError};

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<bool>,
    #[serde(skip_serializing_if = "no_errors")]
    pub errors: &'a [ValidationError],
}

impl<'a> JsonReport<'a> {
    #[must_use]
    pub fn valid(config: &Config) -> Self {
        Self {
            valid: true,
            routes: Some(config.routes.len()),
            targets: Some(config.total_targets()),
            heartbeat: Some(config.heartbeat.enabled),
            errors: &[],
        }
    }

    #[must_use]
    pub const fn invalid(errors: &'a [ValidationError]) -> Self {
        Self {
            valid: false,
            routes: None,
            targets: None,
            heartbeat: None,
            errors,
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn no_errors(errors: &&[ValidationError]) -> bool {
    errors.is_empty()
}

pub fn execute(args: &ValidateArgs) -> Result<(), WaypointError> {
    let config = read_config(&args.config)?;
    let path = args.config.display().to_string();

    match validation::validate(&config) {
        Ok(()) => {
            match args.format {
                ValidateFormat::Text => {
                    println!("\u{2713} {}", validation::format_validation_report(&path, &config));
                }
                ValidateFormat::Json => print_json(&JsonReport::valid(&config)),
            }
            Ok(())
        }
        Err(errors) => {
            match args.format {
                ValidateFormat::Text => {
                    eprintln!("\u{2717} {path} has {} errors\n", errors.len());
                    for error in &errors {
                        eprintln!("{error}");
                    }
                }
                ValidateFormat::Json => print_json(&JsonReport::invalid(&errors)),
            }
            Err(WaypointError::ConfigValidation { errors })
        }
    }
}

fn read_config(path: &Path) -> Result<Config, WaypointError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WaypointError::ConfigFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            WaypointError::Io(e)
        }
    })?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    parse_config_str(ext, &content, &path.display().to_string())
}

fn print_json(report: &JsonReport<'_>) {
    match serde_json::to_string(report) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to encode report: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_report_lists_errors_only() {
        let errors = vec![ValidationError {
            route: "edge".into(),
            field: "listen_port".into(),
            message: "port 70000 is outside 1-65535".into(),
            suggestion: None,
        }];
        let json = serde_json::to_value(JsonReport::invalid(&errors)).unwrap();
        assert_eq!(json["valid"], false);
        assert_eq!(json["errors"][0]["field"], "listen_port");
        assert!(json.get("routes").is_none());
    }

    #[test]
    fn valid_report_counts() {
        let config = Config::default();
        let json = serde_json::to_value(JsonReport::valid(&config)).unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["routes"], 0);
        assert_eq!(json["heartbeat"], false);
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn missing_file_is_reported() {
        let args = ValidateArgs {
            config: "/nonexistent/waypoint.yaml".into(),
            format: ValidateFormat::Text,
        };
        assert!(matches!(
            execute(&args),
            Err(WaypointError::ConfigFileNotFound { .. })
        ));
    }
}
