use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration for sandboxed-methods
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Logging configuration
    pub logging: Option<LoggingConfig>,

    /// Composition behaviour of the runtime
    pub sandbox: Option<SandboxSettings>,

    /// Host types to build for `check` and `call`
    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    /// Capabilities to compose onto those hosts
    #[serde(default)]
    pub compositions: Vec<CompositionConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Enable verbose logging by default
    pub verbose: Option<bool>,

    /// Time format for log timestamps (uses time crate format syntax)
    pub time_format: Option<String>,
}

/// What to do when a composition exposes a name another module already forwards
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail the composition
    #[default]
    Reject,
    /// Point the name at the newer module and log a warning
    Replace,
}

/// Runtime composition settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SandboxSettings {
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,

    /// Refuse modules that declare a method named like a delegate built-in
    #[serde(default)]
    pub reject_builtin_shadowing: bool,
}

/// A host type declared in configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    pub name: String,

    /// Fields seeded onto the sample instance of this type
    #[serde(default)]
    pub fields: BTreeMap<String, toml::Value>,
}

/// A capability composition declared in configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompositionConfig {
    /// Name of a host declared under `[[hosts]]`
    pub host: String,

    /// Registered or qualified capability name
    pub module: String,

    /// Methods to expose; empty exposes the module's whole public surface
    #[serde(default)]
    pub expose: Vec<String>,

    /// Compose onto the type rather than its instances
    #[serde(default)]
    pub class: bool,
}

impl Config {
    /// Load configuration from file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .await
            .context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&content).context("Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Try to load configuration from standard locations
    pub async fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from_file(&path).await;
            }
        }

        Ok(Self::default())
    }

    /// Get potential configuration file paths in order of preference
    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("sandboxed-methods.toml"),
            PathBuf::from(".sandboxed-methods.toml"),
        ];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("sandboxed-methods").join("config.toml"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(
                home_dir
                    .join(".config")
                    .join("sandboxed-methods")
                    .join("config.toml"),
            );
        }

        paths
    }

    /// Check if verbose logging is enabled by default
    pub fn is_verbose_default(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    /// Get the time format for log timestamps
    pub fn get_time_format(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|l| l.time_format.clone())
            .unwrap_or_else(|| "[year]-[month]-[day] [hour]:[minute]:[second]".to_string())
    }

    /// Runtime settings, defaulting when the section is absent
    pub fn get_sandbox_settings(&self) -> SandboxSettings {
        self.sandbox.clone().unwrap_or_default()
    }

    pub fn find_host(&self, name: &str) -> Option<&HostConfig> {
        self.hosts.iter().find(|host| host.name == name)
    }

    /// Save configuration to file
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path.as_ref(), content)
            .await
            .context("Failed to write config file")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_default() {
        let config = Config::default();
        assert!(!config.is_verbose_default());
        assert_eq!(
            config.get_time_format(),
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        );
        assert_eq!(config.get_sandbox_settings(), SandboxSettings::default());
        assert!(config.hosts.is_empty());
        assert!(config.compositions.is_empty());
    }

    #[tokio::test]
    async fn test_config_parse_full() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
[logging]
verbose = true
time_format = "[hour]:[minute]:[second]"

[sandbox]
conflict_policy = "replace"
reject_builtin_shadowing = true

[[hosts]]
name = "FooBar"
fields = { name = "base", names = [] }

[[compositions]]
host = "FooBar"
module = "counter"
expose = ["increment", "count"]

[[compositions]]
host = "FooBar"
module = "tagging"
class = true
"#,
        )
        .await?;

        let config = Config::load_from_file(&config_path).await?;

        assert!(config.is_verbose_default());
        assert_eq!(config.get_time_format(), "[hour]:[minute]:[second]");
        let settings = config.get_sandbox_settings();
        assert_eq!(settings.conflict_policy, ConflictPolicy::Replace);
        assert!(settings.reject_builtin_shadowing);

        let host = config.find_host("FooBar").expect("host declared");
        assert_eq!(
            host.fields.get("name"),
            Some(&toml::Value::String("base".to_string()))
        );

        assert_eq!(config.compositions.len(), 2);
        assert_eq!(config.compositions[0].expose, vec!["increment", "count"]);
        assert!(!config.compositions[0].class);
        assert!(config.compositions[1].expose.is_empty());
        assert!(config.compositions[1].class);

        Ok(())
    }

    #[tokio::test]
    async fn test_config_load_and_save() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            logging: Some(LoggingConfig {
                verbose: Some(true),
                time_format: None,
            }),
            sandbox: Some(SandboxSettings {
                conflict_policy: ConflictPolicy::Reject,
                reject_builtin_shadowing: false,
            }),
            hosts: vec![HostConfig {
                name: "Widget".to_string(),
                fields: BTreeMap::new(),
            }],
            compositions: vec![CompositionConfig {
                host: "Widget".to_string(),
                module: "counter".to_string(),
                expose: Vec::new(),
                class: false,
            }],
        };

        config.save_to_file(&config_path).await?;
        let loaded = Config::load_from_file(&config_path).await?;

        assert!(loaded.is_verbose_default());
        assert_eq!(loaded.hosts.len(), 1);
        assert_eq!(loaded.compositions[0].module, "counter");
        assert_eq!(loaded.get_sandbox_settings().conflict_policy, ConflictPolicy::Reject);

        Ok(())
    }

    #[tokio::test]
    async fn test_config_rejects_unknown_policy() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        tokio::fs::write(&config_path, "[sandbox]\nconflict_policy = \"merge\"\n").await?;

        let result = Config::load_from_file(&config_path).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_config_paths() {
        let paths = Config::get_config_paths();
        assert!(paths
            .iter()
            .any(|p| p.to_string_lossy().contains("sandboxed-methods.toml")));
    }
}
