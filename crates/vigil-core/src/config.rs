use std::{collections::HashMap, fmt::Display, str::FromStr};

use thiserror::Error;

/// Key/value settings of one section of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct SectionConfig {
    inner: HashMap<String, String>,
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("field {field} is required")]
    RequiredValue { field: String },
    #[error("{value} is not a valid value for field {field}: {err}")]
    InvalidValue {
        field: String,
        value: String,
        err: String,
    },
}

impl SectionConfig {
    /// Inserts a new configuration value.
    pub fn insert(&mut self, key: String, value: String) -> Option<String> {
        self.inner.insert(key, value)
    }

    /// Returns a typed configuration value.
    pub fn required<T>(&self, config_name: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        match self.inner.get(config_name) {
            None => Err(ConfigError::RequiredValue {
                field: config_name.to_string(),
            }),
            Some(value) => parse(value, config_name),
        }
    }

    /// Returns an optional typed configuration value.
    pub fn optional<T>(&self, config_name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .map(|value| parse(value, config_name))
            .transpose()
    }

    /// Returns a typed configuration value, or `default` if the field is missing.
    pub fn with_default<T>(&self, config_name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        Ok(self.optional(config_name)?.unwrap_or(default))
    }

    /// Return a comma separed list of values. Return empty vector if field is missing.
    pub fn get_list<T>(&self, config_name: &str) -> Result<Vec<T>, ConfigError>
    where
        T: FromStr,
        <T as FromStr>::Err: Display,
    {
        self.inner
            .get(config_name)
            .iter()
            .flat_map(|config| config.split(','))
            .filter(|item| !item.is_empty())
            .map(|item| parse(item.trim(), config_name))
            .collect()
    }
}

fn parse<T>(value: &str, config_name: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    <T as FromStr>::Err: Display,
{
    T::from_str(value).map_err(|err| ConfigError::InvalidValue {
        field: config_name.to_string(),
        value: value.to_string(),
        err: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn section(pairs: &[(&str, &str)]) -> SectionConfig {
        let mut config = SectionConfig::default();
        for (key, value) in pairs {
            config.insert(key.to_string(), value.to_string());
        }
        config
    }

    #[test]
    fn typed_access() {
        let config = section(&[("host_filesystem", "false"), ("classes", "open, execve,")]);

        assert!(!config.required::<bool>("host_filesystem").unwrap());
        assert_eq!(
            config.with_default("path", PathBuf::from("/etc/vigil/rules")).unwrap(),
            PathBuf::from("/etc/vigil/rules")
        );
        assert_eq!(
            config.get_list::<String>("classes").unwrap(),
            vec!["open".to_string(), "execve".to_string()]
        );
        assert!(matches!(
            config.required::<u32>("missing"),
            Err(ConfigError::RequiredValue { .. })
        ));
    }

    #[test]
    fn invalid_value() {
        let config = section(&[("host_filesystem", "maybe")]);
        let err = config.required::<bool>("host_filesystem").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref value, .. } if value == "maybe"));
    }
}
