use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub scanner: Scanner,
    #[serde(default)]
    pub rules: Rules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scanner {
    /// Path to the inventory snapshot JSON to audit.
    pub snapshot_path: PathBuf,
    /// Where to write the violations report. Stdout if unset.
    pub output_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Rules {
    /// IAM policy rule document. The pass is skipped if unset.
    pub iam_policy: Option<PathBuf>,
    /// Firewall rule document.
    pub firewall: Option<PathBuf>,
    /// Bucket retention rule document.
    pub retention: Option<PathBuf>,
    /// Resource location rule document.
    pub location: Option<PathBuf>,
    /// Group membership rule document.
    pub group: Option<PathBuf>,
    /// Role permission rule document.
    pub role: Option<PathBuf>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("snapshot.json"),
            output_path: None,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder().set_default(
            "scanner.snapshot_path",
            Scanner::default().snapshot_path.to_string_lossy().to_string(),
        )
        .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PLUMBLINE__SCANNER__SNAPSHOT_PATH=..., etc.
        builder =
            builder.add_source(config::Environment::with_prefix("PLUMBLINE").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        // Normalize paths to be relative to the current dir
        let cwd = std::env::current_dir().into_diagnostic()?;
        let normalize = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = cwd.join(p.as_path());
            }
        };
        normalize(&mut s.scanner.snapshot_path);
        if let Some(output) = s.scanner.output_path.as_mut() {
            normalize(output);
        }
        for rule_path in [
            s.rules.iam_policy.as_mut(),
            s.rules.firewall.as_mut(),
            s.rules.retention.as_mut(),
            s.rules.location.as_mut(),
            s.rules.group.as_mut(),
            s.rules.role.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            normalize(rule_path);
        }

        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_settings_load_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nonexistent.toml");

        // Load settings with nonexistent file - should use defaults
        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert!(settings.scanner.snapshot_path.ends_with("snapshot.json"));
        assert!(settings.scanner.output_path.is_none());
        assert!(settings.rules.iam_policy.is_none());
        assert!(settings.rules.firewall.is_none());
    }

    #[test]
    fn test_settings_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[scanner]
snapshot_path = "/data/snapshot.json"
output_path = "/data/violations.json"

[rules]
iam_policy = "/rules/iam.yaml"
firewall = "/rules/firewall.yaml"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert_eq!(
            settings.scanner.snapshot_path,
            PathBuf::from("/data/snapshot.json")
        );
        assert_eq!(
            settings.scanner.output_path,
            Some(PathBuf::from("/data/violations.json"))
        );
        assert_eq!(
            settings.rules.iam_policy,
            Some(PathBuf::from("/rules/iam.yaml"))
        );
        assert_eq!(
            settings.rules.firewall,
            Some(PathBuf::from("/rules/firewall.yaml"))
        );
        assert!(settings.rules.retention.is_none());
    }

    #[test]
    fn test_settings_path_normalization() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("test_config.toml");

        let config_content = r#"
[scanner]
snapshot_path = "relative/snapshot.json"

[rules]
retention = "relative/retention.yaml"
"#;
        fs::write(&config_path, config_content).expect("Failed to write config");

        let settings =
            Settings::load(config_path.to_str().unwrap()).expect("Failed to load settings");

        assert!(settings.scanner.snapshot_path.is_absolute());
        assert!(settings
            .scanner
            .snapshot_path
            .ends_with("relative/snapshot.json"));
        let retention = settings.rules.retention.unwrap();
        assert!(retention.is_absolute());
        assert!(retention.ends_with("relative/retention.yaml"));
    }
}
