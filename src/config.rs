/*!
 * Settings file and environment overrides
 *
 * Settings live in a flat TOML key-value file. Every key can also come from an
 * upper-case environment variable; values in the file win so that operator
 * edits persisted there survive a reload.
 */

use std::env;
use std::path::{Path, PathBuf};

use toml::{Table, Value};
use tracing::debug;
use warden_sentinel::{PolicySource, SentinelError, WatchdogPolicy};

use crate::error::{Result, WardenError};

/// Default settings file name, resolved against the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "uplink-warden.toml";

/// Environment variable naming the settings file
pub const SETTINGS_PATH_ENV: &str = "UPLINK_WARDEN_CONFIG";

#[derive(Debug, Clone, Copy)]
enum Kind {
    Integer,
    Text,
    Switch,
}

/// Environment variable, settings key, value kind
const ENV_KEYS: &[(&str, &str, Kind)] = &[
    ("MAX_ATTEMPTS", "max_attempts", Kind::Integer),
    ("TOTAL_DURATION", "total_duration", Kind::Integer),
    ("CHECK_INTERVAL", "check_interval", Kind::Integer),
    ("WAIT_TIME", "wait_time", Kind::Integer),
    ("SHELLY_IP", "shelly_ip", Kind::Text),
    ("TWILIO_TO_NUMBER", "twilio_to_number", Kind::Text),
    ("TWILIO_ACCOUNT_SID", "twilio_account_sid", Kind::Text),
    ("TWILIO_AUTH_TOKEN", "twilio_auth_token", Kind::Text),
    ("TWILIO_FROM_NUMBER", "twilio_from_number", Kind::Text),
    ("ENABLED", "enabled", Kind::Switch),
];

/// `false`, `0` and `no` (any case) switch off; anything else switches on
pub fn parse_switch(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no"
    )
}

/// Settings keys taken from the environment, via `lookup`
fn env_table<F>(lookup: F) -> Result<Table>
where
    F: Fn(&str) -> Option<String>,
{
    let mut table = Table::new();
    for (var, key, kind) in ENV_KEYS {
        let Some(raw) = lookup(*var) else {
            continue;
        };
        let value = match kind {
            Kind::Integer => {
                let n: i64 = raw.trim().parse().map_err(|_| WardenError::InvalidDuration {
                    key: (*var).to_string(),
                    value: raw.clone(),
                })?;
                Value::Integer(n)
            }
            Kind::Text => Value::String(raw),
            Kind::Switch => Value::Boolean(parse_switch(&raw)),
        };
        table.insert((*key).to_string(), value);
    }
    Ok(table)
}

/// Resolve the settings path: explicit flag, then environment, then default
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| env::var_os(SETTINGS_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
}

/// Settings backed by a TOML file plus process environment
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
    use_env: bool,
}

impl SettingsFile {
    /// Settings at `path`, with environment overrides enabled
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            use_env: true,
        }
    }

    /// Ignore the process environment
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load defaults, then environment, then the file
    pub fn read(&self) -> Result<WatchdogPolicy> {
        let env = if self.use_env {
            env_table(|var| env::var(var).ok())?
        } else {
            Table::new()
        };
        self.read_with(env)
    }

    fn read_with(&self, mut merged: Table) -> Result<WatchdogPolicy> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let file: Table =
                    toml::from_str(&contents).map_err(|source| WardenError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                merged.extend(file);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(
                    "No settings file at {}; using defaults and environment",
                    self.path.display()
                );
            }
            Err(e) => return Err(e.into()),
        }

        Value::Table(merged)
            .try_into::<WatchdogPolicy>()
            .map_err(|e| WardenError::Config(e.to_string()))
    }

    /// Write the policy back as the full key set
    pub fn write(&self, policy: &WatchdogPolicy) -> Result<()> {
        let contents = toml::to_string_pretty(policy)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl PolicySource for SettingsFile {
    fn load(&self) -> warden_sentinel::Result<WatchdogPolicy> {
        self.read().map_err(SentinelError::source_error)
    }

    fn persist(&self, policy: &WatchdogPolicy) -> warden_sentinel::Result<()> {
        self.write(policy).map_err(SentinelError::source_error)
    }
}

/// Render a snapshot for display with secrets masked
pub fn render(policy: &WatchdogPolicy) -> Result<String> {
    Ok(toml::to_string_pretty(&policy.redacted())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsFile::new(dir.path().join("absent.toml")).without_env();

        assert_eq!(settings.read().unwrap(), WatchdogPolicy::default());
    }

    #[test]
    fn test_flat_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uplink-warden.toml");
        std::fs::write(
            &path,
            r#"
max_attempts = 4
total_duration = 3600
check_interval = 15
wait_time = 90
shelly_ip = "10.0.0.9"
twilio_to_number = "+15550001111"
enabled = false
reboot_rate_limit_count = 3
concurrency = "queue"
"#,
        )
        .unwrap();

        let policy = SettingsFile::new(&path).without_env().read().unwrap();

        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.total_duration_s, 3600);
        assert_eq!(policy.check_interval_s, 15);
        assert_eq!(policy.wait_time_s, 90);
        assert_eq!(policy.device_ip, "10.0.0.9");
        assert_eq!(policy.notify_to, "+15550001111");
        assert!(!policy.enabled);
        assert_eq!(policy.rate_limit_count, 3);
        assert_eq!(
            policy.concurrency,
            warden_sentinel::ConcurrencyPolicy::Queue
        );
        assert_eq!(policy.rate_limit_pause_s, 72000);
    }

    #[test]
    fn test_env_overrides_defaults_but_not_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uplink-warden.toml");
        std::fs::write(&path, "shelly_ip = \"10.0.0.2\"\n").unwrap();

        let env = env_table(lookup(&[
            ("SHELLY_IP", "10.0.0.1"),
            ("WAIT_TIME", "45"),
            ("ENABLED", "No"),
            ("TWILIO_ACCOUNT_SID", "AC1"),
        ]))
        .unwrap();
        let policy = SettingsFile::new(&path).read_with(env).unwrap();

        assert_eq!(policy.device_ip, "10.0.0.2");
        assert_eq!(policy.wait_time_s, 45);
        assert!(!policy.enabled);
        assert_eq!(policy.twilio_account_sid.as_deref(), Some("AC1"));
    }

    #[test]
    fn test_bad_env_number() {
        let err = env_table(lookup(&[("MAX_ATTEMPTS", "ten")])).unwrap_err();
        assert!(matches!(err, WardenError::InvalidDuration { .. }));
    }

    #[test]
    fn test_parse_switch() {
        for off in ["false", "FALSE", "0", "no", " No "] {
            assert!(!parse_switch(off), "{off}");
        }
        for on in ["true", "1", "yes", "enabled", ""] {
            assert!(parse_switch(on), "{on}");
        }
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsFile::new(dir.path().join("nested/uplink-warden.toml")).without_env();
        let policy = WatchdogPolicy {
            max_attempts: 7,
            device_ip: "10.1.1.1".into(),
            ..Default::default()
        };

        settings.write(&policy).unwrap();

        assert_eq!(settings.read().unwrap(), policy);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "max_attempts = [").unwrap();

        let err = SettingsFile::new(&path).without_env().read().unwrap_err();
        assert!(matches!(err, WardenError::Parse { .. }));
    }

    #[test]
    fn test_render_redacts_token() {
        let policy = WatchdogPolicy {
            twilio_auth_token: Some("secret".into()),
            ..Default::default()
        };
        let text = render(&policy).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("shelly_ip"));
    }
}
