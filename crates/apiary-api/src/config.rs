//! Configuration loading: defaults, merged config files, environment
//! overrides, CLI flags.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Bind address; a bare hostname gets the default port appended.
    #[serde(default = "AppConfig::default_host")]
    pub host: String,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub merging: MergingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            services: Vec::new(),
            storage: StorageConfig::default(),
            merging: MergingConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    fn default_host() -> String {
        "localhost".to_string()
    }

    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') {
            self.host.clone()
        } else {
            format!("{}:8080", self.host)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            bail!("at least one service must be configured");
        }
        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                bail!("service name must not be empty");
            }
            if service.url.trim().is_empty() {
                bail!("service {:?} has an empty url", service.name);
            }
            if !names.insert(service.name.as_str()) {
                bail!("duplicate service name {:?}", service.name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(rename = "type", default)]
    pub storage_type: StorageType,
    #[serde(default)]
    pub bucket_name: String,
    #[serde(default)]
    pub iam_role_enabled: bool,
    #[serde(default)]
    pub disk: DiskConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub gcs: GcsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Disk,
    S3,
    Gcs,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiskConfig {
    #[serde(default = "DiskConfig::default_path")]
    pub path: String,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self { path: Self::default_path() }
    }
}

impl DiskConfig {
    fn default_path() -> String {
        ".apiary".to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub session_key: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsConfig {
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub filename: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergingConfig {
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "apiary",
    version,
    about = "Aggregates versioned OpenAPI documents from a fleet of services"
)]
pub struct Args {
    /// Configuration file; repeatable, later files merge over earlier ones.
    #[arg(long = "config-file")]
    pub config_file: Vec<PathBuf>,

    /// OpenAPI fragment merged into every collated document; repeatable.
    #[arg(long = "overlay-file")]
    pub overlay_file: Vec<PathBuf>,

    /// Time between scrape runs.
    #[arg(long = "scrape-interval", default_value = "10m", value_parser = parse_duration)]
    pub scrape_interval: Duration,

    /// Bound on waiting for the in-flight scrape during shutdown.
    #[arg(long = "graceful-timeout", default_value = "15s", value_parser = parse_duration)]
    pub graceful_timeout: Duration,
}

/// Durations in `500ms`, `30s`, `5m`, or `1h` form; a bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration {s:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "" | "s" => Ok(Duration::from_secs(number)),
        "m" => Ok(Duration::from_secs(number * 60)),
        "h" => Ok(Duration::from_secs(number * 3600)),
        _ => Err(format!("invalid duration unit {unit:?} in {s:?}")),
    }
}

/// Load configuration: defaults, then each file merged over the previous
/// result, then environment overrides, then validation.
pub fn load_config(paths: &[PathBuf]) -> Result<AppConfig> {
    let mut value = serde_json::to_value(AppConfig::default())?;
    for path in paths {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        // YAML is a superset of JSON, so one parser covers both.
        let file: Value = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        merge_values(&mut value, &file);
    }
    apply_env_overrides(&mut value, std::env::vars());
    let cfg: AppConfig = serde_json::from_value(value).context("invalid configuration")?;
    cfg.validate()?;
    Ok(cfg)
}

/// Deep merge: objects recurse, everything else is replaced by `src`.
fn merge_values(dst: &mut Value, src: &Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_val) in src_map {
                match dst_map.get_mut(key) {
                    Some(dst_val) => merge_values(dst_val, src_val),
                    None => {
                        dst_map.insert(key.clone(), src_val.clone());
                    }
                }
            }
        }
        (dst, src) => *dst = src.clone(),
    }
}

/// Environment overrides by nested-key convention: `STORAGE_S3_REGION` sets
/// `storage.s3.region`. Underscores may fall anywhere a camelCase key could
/// be split, so `STORAGE_BUCKET_NAME` and `STORAGE_BUCKETNAME` both reach
/// `storage.bucketName`. Matching is case-insensitive; only scalar leaves
/// that already exist are overridden.
fn apply_env_overrides(value: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, raw) in vars {
        let segments: Vec<String> = key.split('_').map(|s| s.to_ascii_lowercase()).collect();
        set_path(value, &segments, &raw);
    }
}

fn set_path(value: &mut Value, segments: &[String], raw: &str) -> bool {
    let Value::Object(map) = value else {
        return false;
    };
    // A config key may span several underscore-separated segments.
    for split in 1..=segments.len() {
        let joined = segments[..split].concat();
        let Some(actual) = map
            .keys()
            .find(|k| k.to_ascii_lowercase() == joined)
            .cloned()
        else {
            continue;
        };
        let rest = &segments[split..];
        if rest.is_empty() {
            let existing = &map[actual.as_str()];
            if existing.is_object() || existing.is_array() {
                continue;
            }
            let coerced = coerce(raw, existing);
            map.insert(actual, coerced);
            return true;
        }
        if let Some(child) = map.get_mut(&actual) {
            if set_path(child, rest, raw) {
                return true;
            }
        }
    }
    false
}

fn coerce(raw: &str, existing: &Value) -> Value {
    match existing {
        Value::Bool(_) => raw
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Value::Number(_) => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_are_sensible() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.listen_addr(), "localhost:8080");
        assert_eq!(cfg.storage.storage_type, StorageType::Disk);
        assert!(cfg.merging.exclude_patterns.is_empty());
    }

    #[test]
    fn listen_addr_keeps_explicit_port() {
        let cfg = AppConfig {
            host: "0.0.0.0:9999".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(cfg.listen_addr(), "0.0.0.0:9999");
    }

    #[test]
    fn later_files_merge_over_earlier() {
        let base = write_config(
            r#"
host: first
services:
  - name: petfood
    url: http://petfood.internal
storage:
  type: disk
  disk:
    path: /tmp/apiary
"#,
        );
        let overlay = write_config(
            r#"
host: second
merging:
  excludePatterns: ["/_internal/**"]
"#,
        );
        let cfg =
            load_config(&[base.path().to_path_buf(), overlay.path().to_path_buf()]).unwrap();
        assert_eq!(cfg.host, "second");
        assert_eq!(cfg.services.len(), 1);
        assert_eq!(cfg.storage.disk.path, "/tmp/apiary");
        assert_eq!(cfg.merging.exclude_patterns, vec!["/_internal/**"]);
    }

    #[test]
    fn json_config_files_parse_too() {
        let file = write_config(
            r#"{"services": [{"name": "a", "url": "http://a"}], "storage": {"type": "s3", "bucketName": "specs"}}"#,
        );
        let cfg = load_config(&[file.path().to_path_buf()]).unwrap();
        assert_eq!(cfg.storage.storage_type, StorageType::S3);
        assert_eq!(cfg.storage.bucket_name, "specs");
    }

    #[test]
    fn env_overrides_nested_keys() {
        let mut value = serde_json::to_value(AppConfig::default()).unwrap();
        apply_env_overrides(
            &mut value,
            vec![
                ("STORAGE_S3_REGION".to_string(), "eu-west-1".to_string()),
                ("STORAGE_IAMROLEENABLED".to_string(), "true".to_string()),
                ("HOST".to_string(), "0.0.0.0".to_string()),
                ("STORAGE_BUCKETNAME".to_string(), "specs".to_string()),
                ("UNRELATED_VAR".to_string(), "x".to_string()),
            ]
            .into_iter(),
        );
        let cfg: AppConfig = serde_json::from_value(value).unwrap();
        assert_eq!(cfg.storage.s3.region, "eu-west-1");
        assert!(cfg.storage.iam_role_enabled);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.storage.bucket_name, "specs");
    }

    #[test]
    fn env_overrides_split_camel_case_keys() {
        let mut value = serde_json::to_value(AppConfig::default()).unwrap();
        apply_env_overrides(
            &mut value,
            vec![
                ("STORAGE_BUCKET_NAME".to_string(), "specs".to_string()),
                ("STORAGE_S3_ACCESS_KEY".to_string(), "AKIA123".to_string()),
                ("STORAGE_S3_SECRET_KEY".to_string(), "shh".to_string()),
                ("STORAGE_IAM_ROLE_ENABLED".to_string(), "true".to_string()),
            ]
            .into_iter(),
        );
        let cfg: AppConfig = serde_json::from_value(value).unwrap();
        assert_eq!(cfg.storage.bucket_name, "specs");
        assert_eq!(cfg.storage.s3.access_key, "AKIA123");
        assert_eq!(cfg.storage.s3.secret_key, "shh");
        assert!(cfg.storage.iam_role_enabled);
    }

    #[test]
    fn validation_rejects_bad_service_lists() {
        let empty = AppConfig::default();
        assert!(empty.validate().is_err());

        let dup = AppConfig {
            services: vec![
                ServiceConfig { name: "a".into(), url: "http://a".into() },
                ServiceConfig { name: "a".into(), url: "http://b".into() },
            ],
            ..AppConfig::default()
        };
        assert!(dup.validate().is_err());

        let ok = AppConfig {
            services: vec![ServiceConfig { name: "a".into(), url: "http://a".into() }],
            ..AppConfig::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn durations_parse() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10d").is_err());
    }
}
