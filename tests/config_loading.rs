//! Integration tests for config loading and validation.

use std::io::Write;

use waypoint::config::model::Config;
use waypoint::config::validation::validate;
use waypoint::config::{load_file, parse_config_str};
use waypoint::error::WaypointError;

fn write_temp(ext: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(&format!(".{ext}"))
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn bundled_example_loads_and_validates() {
    let config = load_file(std::path::Path::new("config/config.yaml"))
        .await
        .unwrap();

    assert_eq!(config.routes.len(), 1);
    assert_eq!(config.total_targets(), 2);
    assert!(config.heartbeat.enabled);
    assert_eq!(config.heartbeat.status_text, "Proxy Server Live");

    let route = &config.routes[0];
    assert_eq!(route.listen_port, 8081);
    assert_eq!(route.targets[0].path_prefix, "svc1");
    assert_eq!(route.targets[0].base_url(), "http://127.0.0.1:9001");
}

#[test]
fn legacy_key_spellings_are_accepted() {
    let yaml = r"
heartbeat:
  enabled: true
  interval: 30
  timeout: 10
  retriesbeforefail: 2
  statustext: up
  statuspath: /hb
  statusurl: http://localhost:9090/hb
  listenport: 9090
routes:
  - name: edge
    listenhost: 127.0.0.1
    listenport: 8081
    targets:
      - name: a
        pathprefix: svc1
        host: 127.0.0.1
        port: 9001
";
    let config = parse_config_str("yaml", yaml, "legacy.yaml").unwrap();
    validate(&config).unwrap();

    assert_eq!(config.heartbeat.interval_secs, 30);
    assert_eq!(config.heartbeat.retries_before_fail, 2);
    assert_eq!(config.heartbeat.status_path, "/hb");
    assert_eq!(config.routes[0].listen_host, "127.0.0.1");
    assert_eq!(config.routes[0].protocol, "http");
    assert_eq!(config.routes[0].pattern, "/");
    assert_eq!(config.routes[0].targets[0].path_prefix, "svc1");
}

#[test]
fn unknown_keys_are_rejected() {
    let yaml = r"
routes:
  - name: edge
    listen_port: 8081
    fallback: svc1
    targets: []
";
    let err = parse_config_str("yaml", yaml, "bad.yaml").unwrap_err();
    assert!(matches!(err, WaypointError::ConfigParse { .. }));
}

#[test]
fn out_of_range_port_reaches_the_validator() {
    let yaml = r"
routes:
  - name: edge
    listen_port: 70000
    targets:
      - name: a
        path_prefix: svc1
        host: 127.0.0.1
        port: 0
";
    let config = parse_config_str("yaml", yaml, "ports.yaml").unwrap();
    let errors = validate(&config).unwrap_err();

    assert!(errors.iter().any(|e| e.field == "listen_port"));
    assert!(errors.iter().any(|e| e.field == "targets.a.port"));
}

#[test]
fn https_target_without_material_is_a_validation_error() {
    let yaml = r"
routes:
  - name: edge
    listen_port: 8081
    targets:
      - name: secure
        path_prefix: secure
        protocol: https
        host: internal.example.com
        port: 9443
";
    let config = parse_config_str("yaml", yaml, "tls.yaml").unwrap();
    let errors = validate(&config).unwrap_err();

    assert!(errors.iter().any(|e| e.field == "targets.secure.cert_file"));
    assert!(errors.iter().any(|e| e.field == "targets.secure.key_file"));
}

#[tokio::test]
async fn missing_file_is_reported_by_path() {
    let err = load_file(std::path::Path::new("/nonexistent/waypoint.yaml"))
        .await
        .unwrap_err();
    match err {
        WaypointError::ConfigFileNotFound { path } => {
            assert_eq!(path, std::path::PathBuf::from("/nonexistent/waypoint.yaml"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_file_fails_before_anything_starts() {
    let file = write_temp("yaml", "routes: []\n");
    let err = load_file(file.path()).await.unwrap_err();
    match err {
        WaypointError::ConfigValidation { errors } => {
            assert_eq!(errors[0].field, "routes");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unsupported_format_returns_error() {
    let result = parse_config_str("xml", "{}", "test.xml");
    assert!(matches!(result, Err(WaypointError::UnsupportedFormat(_))));
}

#[cfg(feature = "json")]
#[test]
fn json_config_parses() {
    let json = r#"{
        "routes": [
            {"name": "edge", "listen_port": 8081, "targets": [
                {"name": "a", "path_prefix": "svc1", "host": "127.0.0.1", "port": 9001},
                {"name": "b", "path_prefix": "svc2", "host": "127.0.0.1", "port": 9002}
            ]}
        ]
    }"#;
    let config: Config = parse_config_str("json", json, "test.json").unwrap();
    validate(&config).unwrap();
    assert_eq!(config.total_targets(), 2);
}

#[cfg(feature = "toml")]
#[test]
fn toml_config_parses() {
    let toml = r#"
[[routes]]
name = "edge"
listen_port = 8081

[[routes.targets]]
name = "a"
path_prefix = "svc1"
host = "127.0.0.1"
port = 9001
"#;
    let config = parse_config_str("toml", toml, "test.toml").unwrap();
    validate(&config).unwrap();
    assert_eq!(config.routes[0].targets[0].port, 9001);
}
