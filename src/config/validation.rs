//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`Config`] for structural
//! errors: routes without targets, empty or duplicate path prefixes, ports
//! outside 1–65535, unknown protocols, and https certificate material that
//! is missing, not a regular file or unreadable. Returns every
//! [`ValidationError`] found, with per-field suggestions.

use std::collections::HashSet;
use std::path::Path;

use super::model::{Config, HeartbeatConfig, Protocol, Route, Target};
use crate::error::ValidationError;

/// Validate a listen or target port. Returns `Ok(())` or a human-readable error.
pub fn validate_port(port: u32) -> Result<(), String> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(format!("port {port} is outside 1-65535"))
    }
}

/// Validate a protocol string. Returns `Ok(())` or a human-readable error.
pub fn validate_protocol(protocol: &str) -> Result<(), String> {
    protocol.parse::<Protocol>().map(|_| ())
}

/// Validate a route mount pattern. Empty means "serve everything".
pub fn validate_pattern(pattern: &str) -> Result<(), String> {
    if pattern.is_empty() || pattern.starts_with('/') {
        Ok(())
    } else {
        Err(format!(
            "pattern must start with '/' (did you mean '/{pattern}'?)"
        ))
    }
}

/// Validate a path prefix: non-empty, a single segment.
pub fn validate_path_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("path prefix cannot be empty".into());
    }
    if prefix.contains('/') {
        return Err(format!("path prefix '{prefix}' must be a single path segment"));
    }
    Ok(())
}

/// Check that `path` names an existing, regular, readable file.
pub fn validate_readable_file(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("file path is required for https".into());
    }
    let p = Path::new(path);
    let metadata = std::fs::metadata(p).map_err(|_| format!("file '{path}' does not exist"))?;
    if !metadata.is_file() {
        return Err(format!("'{path}' is not a regular file"));
    }
    std::fs::File::open(p).map_err(|e| format!("file '{path}' is not readable: {e}"))?;
    Ok(())
}

pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.heartbeat.enabled {
        validate_heartbeat(&config.heartbeat, &mut errors);
    }

    if config.routes.is_empty() {
        errors.push(ValidationError {
            route: "(root)".into(),
            field: "routes".into(),
            message: "at least one route must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_names = HashSet::new();

    for (i, route) in config.routes.iter().enumerate() {
        let route_id = if route.name.is_empty() {
            format!("routes[{i}]")
        } else {
            route.name.clone()
        };

        if route.name.is_empty() {
            errors.push(error(&route_id, "name", "route name cannot be empty".into()));
        } else if !seen_names.insert(route.name.as_str()) {
            errors.push(error(&route_id, "name", "duplicate route name".into()));
        }

        validate_route(route, &route_id, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_route(route: &Route, route_id: &str, errors: &mut Vec<ValidationError>) {
    if route.listen_host.is_empty() {
        errors.push(error(route_id, "listen_host", "listen host cannot be empty".into()));
    }

    if let Err(msg) = validate_port(route.listen_port) {
        errors.push(error(route_id, "listen_port", msg));
    }

    if let Err(msg) = validate_pattern(&route.pattern) {
        errors.push(ValidationError {
            route: route_id.to_string(),
            field: "pattern".into(),
            message: msg,
            suggestion: Some(format!("did you mean '/{}'?", route.pattern)),
        });
    }

    match route.protocol.parse::<Protocol>() {
        Ok(Protocol::Https) => {
            for (field, path) in [("cert_file", &route.cert_file), ("key_file", &route.key_file)] {
                if let Err(msg) = validate_readable_file(path) {
                    errors.push(error(route_id, field, msg));
                }
            }
        }
        Ok(Protocol::Http) => {}
        Err(msg) => errors.push(error(route_id, "protocol", msg)),
    }

    if route.targets.is_empty() {
        errors.push(error(
            route_id,
            "targets",
            "at least one target must be defined".into(),
        ));
        return;
    }

    let mut seen_prefixes = HashSet::new();
    for (i, target) in route.targets.iter().enumerate() {
        let field_base = if target.name.is_empty() {
            format!("targets[{i}]")
        } else {
            format!("targets.{}", target.name)
        };

        if let Err(msg) = validate_path_prefix(&target.path_prefix) {
            errors.push(ValidationError {
                route: route_id.to_string(),
                field: format!("{field_base}.path_prefix"),
                message: msg,
                suggestion: target
                    .path_prefix
                    .split('/')
                    .find(|s| !s.is_empty())
                    .map(|s| format!("did you mean '{s}'?")),
            });
        } else if !seen_prefixes.insert(target.path_prefix.as_str()) {
            errors.push(error(
                route_id,
                &format!("{field_base}.path_prefix"),
                format!("duplicate path prefix '{}'", target.path_prefix),
            ));
        }

        validate_target(target, route_id, &field_base, errors);
    }
}

fn validate_target(
    target: &Target,
    route_id: &str,
    field_base: &str,
    errors: &mut Vec<ValidationError>,
) {
    if target.host.is_empty() {
        errors.push(error(
            route_id,
            &format!("{field_base}.host"),
            "host cannot be empty".into(),
        ));
    }

    if let Err(msg) = validate_port(target.port) {
        errors.push(error(route_id, &format!("{field_base}.port"), msg));
    }

    match target.protocol.parse::<Protocol>() {
        Ok(Protocol::Https) => {
            for (field, path) in [("cert_file", &target.cert_file), ("key_file", &target.key_file)]
            {
                if let Err(msg) = validate_readable_file(path) {
                    errors.push(error(route_id, &format!("{field_base}.{field}"), msg));
                }
            }
        }
        Ok(Protocol::Http) => {}
        Err(msg) => errors.push(error(route_id, &format!("{field_base}.protocol"), msg)),
    }
}

fn validate_heartbeat(heartbeat: &HeartbeatConfig, errors: &mut Vec<ValidationError>) {
    const ROUTE: &str = "(heartbeat)";

    if heartbeat.interval_secs == 0 {
        errors.push(error(ROUTE, "interval_secs", "interval must be positive".into()));
    }
    if heartbeat.timeout_secs == 0 {
        errors.push(error(ROUTE, "timeout_secs", "timeout must be positive".into()));
    }
    if heartbeat.retries_before_fail == 0 {
        errors.push(error(
            ROUTE,
            "retries_before_fail",
            "retries before fail must be at least 1".into(),
        ));
    }
    if !heartbeat.status_path.starts_with('/') {
        errors.push(ValidationError {
            route: ROUTE.into(),
            field: "status_path".into(),
            message: "status path must start with '/'".into(),
            suggestion: Some(format!("did you mean '/{}'?", heartbeat.status_path)),
        });
    }
    if let Err(msg) = validate_port(heartbeat.listen_port) {
        errors.push(error(ROUTE, "listen_port", msg));
    }
}

fn error(route: &str, field: &str, message: String) -> ValidationError {
    ValidationError {
        route: route.to_string(),
        field: field.to_string(),
        message,
        suggestion: None,
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &Config) -> String {
    let total_targets = config.total_targets();
    let mut lines = vec![format!(
        "  {} routes, {} targets\n",
        config.routes.len(),
        total_targets
    )];

    for route in &config.routes {
        lines.push(format!(
            "  {}  {}://{}{}  -> {} targets",
            route.name,
            route.protocol,
            route.listen_addr(),
            route.pattern,
            route.targets.len(),
        ));
        for target in &route.targets {
            lines.push(format!(
                "    /{}  -> {}",
                target.path_prefix,
                target.base_url()
            ));
        }
    }

    if config.heartbeat.enabled {
        lines.push(format!(
            "  heartbeat  {}{} every {}s (timeout {}s)",
            config.heartbeat.listen_addr(),
            config.heartbeat.status_path,
            config.heartbeat.interval_secs,
            config.heartbeat.timeout_secs,
        ));
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
