use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use vigil_core::config::SectionConfig;

const DEFAULT_CONFIG_FILE: &str = "/etc/vigil/vigil.ini";
const DEFAULT_RULES_PATH: &str = "/etc/vigil/rules";

pub const RULES_SECTION: &str = "rules";
pub const ENGINE_SECTION: &str = "engine";

/// Vigil configuration, backed by an `INI` file.
///
/// ```ini
/// [rules]
/// path = /etc/vigil/rules, /usr/share/vigil/rules
///
/// [engine]
/// host_filesystem = true
/// ```
#[derive(Debug, Clone, Default)]
pub struct VigilConfig {
    sections: HashMap<String, SectionConfig>,
}

impl VigilConfig {
    /// Load the default file. A missing default file means default settings.
    pub fn new() -> Result<Self> {
        let config_file = Path::new(DEFAULT_CONFIG_FILE);
        if !config_file.exists() {
            log::debug!("{DEFAULT_CONFIG_FILE} not found, using defaults");
            return Ok(Self::default());
        }
        Self::from_config_file(config_file)
    }

    /// Load a custom file, which must exist.
    pub fn with_custom_file(config_file: &str) -> Result<Self> {
        let config_file = Path::new(config_file);
        if !config_file.exists() {
            bail!("Configuration file {} not found", config_file.display());
        }
        Self::from_config_file(config_file)
    }

    fn from_config_file(config_file: &Path) -> Result<Self> {
        let mut sections: HashMap<String, SectionConfig> = HashMap::new();

        let conf = ini::Ini::load_from_file(config_file)
            .with_context(|| format!("Error loading configuration from {config_file:?}"))?;

        for (section, prop) in &conf {
            if let Some(section) = section {
                let section_config = sections.entry(section.to_string()).or_default();
                for (key, value) in prop.iter() {
                    log::debug!("{}.{}={}", section, key, value);
                    section_config.insert(key.to_string(), value.to_string());
                }
            }
        }

        Ok(Self { sections })
    }

    /// Settings of `section`, empty if the file doesn't have it.
    pub fn section(&self, section: &str) -> SectionConfig {
        self.sections.get(section).cloned().unwrap_or_default()
    }

    /// Directories scanned for rule files.
    pub fn rules_paths(&self) -> Result<Vec<PathBuf>> {
        let paths: Vec<PathBuf> = self
            .section(RULES_SECTION)
            .get_list("path")
            .context("Invalid rules path")?;
        if paths.is_empty() {
            Ok(vec![PathBuf::from(DEFAULT_RULES_PATH)])
        } else {
            Ok(paths)
        }
    }

    /// Resolve file attributes against the host filesystem.
    pub fn host_filesystem(&self) -> Result<bool> {
        self.section(ENGINE_SECTION)
            .with_default("host_filesystem", true)
            .context("Invalid engine configuration")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults() {
        let config = VigilConfig::default();
        assert_eq!(
            config.rules_paths().unwrap(),
            vec![PathBuf::from(DEFAULT_RULES_PATH)]
        );
        assert!(config.host_filesystem().unwrap());
    }

    #[test]
    fn custom_file() {
        let file = write_config(
            "[rules]\npath = /srv/rules, /opt/rules\n\n[engine]\nhost_filesystem = false\n",
        );
        let config = VigilConfig::with_custom_file(file.path().to_str().unwrap()).unwrap();

        assert_eq!(
            config.rules_paths().unwrap(),
            vec![PathBuf::from("/srv/rules"), PathBuf::from("/opt/rules")]
        );
        assert!(!config.host_filesystem().unwrap());
    }

    #[test]
    fn invalid_values() {
        let file = write_config("[engine]\nhost_filesystem = maybe\n");
        let config = VigilConfig::with_custom_file(file.path().to_str().unwrap()).unwrap();
        assert!(config.host_filesystem().is_err());
    }

    #[test]
    fn missing_custom_file() {
        assert!(VigilConfig::with_custom_file("/nonexistent/vigil.ini").is_err());
    }
}
