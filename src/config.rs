//! YAML configuration for VMware AIops.
//!
//! Targets, scanner and notification settings are read from
//! `~/.vmware-aiops/config.yaml` (or an explicit path). Passwords never live
//! in the file: each target resolves its credential from an environment
//! variable derived from its name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::model::Severity;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "VMWARE_AIOPS_CONFIG";

/// Per-user state directory (`~/.vmware-aiops`).
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vmware-aiops")
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    state_dir().join("config.yaml")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config {
                path: path.to_path_buf(),
                message: format!(
                    "config file not found, copy config.example.yaml to {}",
                    default_config_path().display()
                ),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content).map_err(|message| Error::Config {
            path: path.to_path_buf(),
            message,
        })?;
        info!(
            path = %path.display(),
            targets = config.targets.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Resolve the config path, in order: explicit argument,
    /// `VMWARE_AIOPS_CONFIG`, then the per-user default.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            debug!(path = %env_path, "using config path from environment");
            return PathBuf::from(env_path);
        }
        default_config_path()
    }

    /// Load from the resolved location.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        Self::load(&Self::resolve_path(explicit))
    }

    /// Parse a YAML document. An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut config: Self = serde_yaml::from_str(content).map_err(|e| match e.location() {
            Some(loc) => format!("invalid YAML at line {}: {}", loc.line(), e),
            None => e.to_string(),
        })?;
        config.notify.log_file = expand_home(&config.notify.log_file);
        config.audit.log_file = expand_home(&config.audit.log_file);
        Ok(config)
    }

    /// Look up a target by name.
    pub fn get_target(&self, name: &str) -> Result<&TargetConfig> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::not_found_among("target", name, self.target_names()))
    }

    /// The first configured target.
    pub fn default_target(&self) -> Result<&TargetConfig> {
        self.targets.first().ok_or(Error::NoTargets)
    }

    pub fn target_names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Vcenter,
    Esxi,
}

/// A vCenter or ESXi endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default, rename = "type")]
    pub kind: TargetKind,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Accepts the legacy `verify_ssl` key.
    #[serde(default, alias = "verify_ssl")]
    pub verify_tls: bool,
}

fn default_username() -> String {
    "administrator@vsphere.local".to_string()
}

fn default_port() -> u16 {
    443
}

impl TargetConfig {
    /// Name of the environment variable holding this target's password.
    pub fn password_env(&self) -> String {
        let normalized: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("VMWARE_{normalized}_PASSWORD")
    }

    /// Resolve the password from the environment. Nothing is cached.
    pub fn password(&self) -> Result<String> {
        let var = self.password_env();
        match std::env::var(&var) {
            Ok(pw) if !pw.is_empty() => Ok(pw),
            _ => Err(Error::MissingCredential { var }),
        }
    }

    /// Base URL of the endpoint's API.
    pub fn base_url(&self) -> String {
        if self.port == 443 {
            format!("https://{}", self.host)
        } else {
            format!("https://{}:{}", self.host, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// Scanner daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub log_types: Vec<String>,
    pub severity_threshold: Severity,
    pub lookback_hours: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 15,
            log_types: vec!["vpxd".into(), "hostd".into(), "vmkernel".into()],
            severity_threshold: Severity::Warning,
            lookback_hours: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub log_file: PathBuf,
    /// Empty disables webhook delivery.
    pub webhook_url: String,
    pub webhook_timeout: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log_file: state_dir().join("scan.log"),
            webhook_url: String::new(),
            webhook_timeout: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub log_file: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_file: state_dir().join("audit.log"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
targets:
  - name: test-vc
    host: 10.0.0.1
    username: admin@vsphere.local
    type: vcenter
    port: 443
  - name: test-esxi
    host: 10.0.0.2
    username: root
    type: esxi
    verify_ssl: true

scanner:
  enabled: true
  interval_minutes: 5
  log_types: [hostd, vmkernel]
  severity_threshold: critical
  lookback_hours: 2

notify:
  log_file: /tmp/test-scan.log
  webhook_url: https://hooks.example.com/test
"#;

    #[test]
    fn test_load_targets() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.targets.len(), 2);
        assert_eq!(cfg.targets[0].name, "test-vc");
        assert_eq!(cfg.targets[0].kind, TargetKind::Vcenter);
        assert_eq!(cfg.targets[1].kind, TargetKind::Esxi);
        assert!(cfg.targets[1].verify_tls);
        assert!(!cfg.targets[0].verify_tls);
    }

    #[test]
    fn test_scanner_and_notify_sections() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.scanner.interval_minutes, 5);
        assert_eq!(cfg.scanner.log_types, vec!["hostd", "vmkernel"]);
        assert_eq!(cfg.scanner.severity_threshold, Severity::Critical);
        assert_eq!(cfg.scanner.lookback_hours, 2);
        assert_eq!(cfg.notify.webhook_url, "https://hooks.example.com/test");
        assert_eq!(cfg.notify.log_file, PathBuf::from("/tmp/test-scan.log"));
        assert_eq!(cfg.notify.webhook_timeout, 10);
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let cfg = AppConfig::from_yaml("targets:\n  - name: a\n    host: h\n").unwrap();
        let target = &cfg.targets[0];
        assert_eq!(target.port, 443);
        assert_eq!(target.username, "administrator@vsphere.local");
        assert_eq!(cfg.scanner, ScannerConfig::default());
        assert!(cfg.notify.webhook_url.is_empty());
    }

    #[test]
    fn test_empty_document_is_default() {
        let cfg = AppConfig::from_yaml("").unwrap();
        assert!(cfg.targets.is_empty());
        assert!(matches!(cfg.default_target(), Err(Error::NoTargets)));
    }

    #[test]
    fn test_get_target_not_found_lists_available() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        let err = cfg.get_target("not-exist").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("not-exist"));
        assert!(msg.contains("test-vc, test-esxi"));
    }

    #[test]
    fn test_default_target_is_first() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.default_target().unwrap().name, "test-vc");
    }

    #[test]
    fn test_password_env_name() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.targets[0].password_env(), "VMWARE_TEST_VC_PASSWORD");
        let dotted = TargetConfig {
            name: "lab.vc-01".into(),
            ..cfg.targets[0].clone()
        };
        assert_eq!(dotted.password_env(), "VMWARE_LAB_VC_01_PASSWORD");
    }

    #[test]
    fn test_password_resolution() {
        let target = TargetConfig {
            name: "pw-resolution-case".into(),
            host: "h".into(),
            username: default_username(),
            kind: TargetKind::Vcenter,
            port: 443,
            verify_tls: false,
        };
        std::env::remove_var("VMWARE_PW_RESOLUTION_CASE_PASSWORD");
        match target.password() {
            Err(Error::MissingCredential { var }) => {
                assert_eq!(var, "VMWARE_PW_RESOLUTION_CASE_PASSWORD")
            }
            other => panic!("expected missing credential, got {other:?}"),
        }

        std::env::set_var("VMWARE_PW_RESOLUTION_CASE_PASSWORD", "secret123");
        assert_eq!(target.password().unwrap(), "secret123");
        std::env::remove_var("VMWARE_PW_RESOLUTION_CASE_PASSWORD");
    }

    #[test]
    fn test_invalid_yaml_reports_line() {
        let err = AppConfig::from_yaml("targets: [\n  - {name: a").unwrap_err();
        assert!(err.contains("line"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = AppConfig::load(Path::new("/nonexistent/config.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_log_paths_expand_home() {
        let cfg = AppConfig::from_yaml("audit:\n  log_file: ~/.vmware-aiops/audit.log\n").unwrap();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(cfg.audit.log_file, home.join(".vmware-aiops/audit.log"));
        }
        assert_eq!(
            expand_home(Path::new("/var/log/scan.log")),
            PathBuf::from("/var/log/scan.log")
        );
    }

    #[test]
    fn test_base_url() {
        let cfg = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(cfg.targets[0].base_url(), "https://10.0.0.1");
        let custom = TargetConfig {
            port: 8443,
            ..cfg.targets[0].clone()
        };
        assert_eq!(custom.base_url(), "https://10.0.0.1:8443");
    }
}
