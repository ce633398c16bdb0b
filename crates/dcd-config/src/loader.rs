//! YAML configuration loader
//!
//! Resolves the custom tags Home Assistant users put in `configuration.yaml`:
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! Unknown tags are kept as-is with their inner value processed.

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::{Mapping, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Name of the main configuration file
pub const CONFIGURATION_FILE: &str = "configuration.yaml";

/// Name of the secrets file
pub const SECRETS_FILE: &str = "secrets.yaml";

/// YAML loader with support for Home Assistant custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    secrets: HashMap<String, String>,
    /// Files currently being loaded, to detect circular includes
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a loader for `config_dir`, reading `secrets.yaml` if present
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = load_secrets(&config_dir.join(SECRETS_FILE))?;

        Ok(Self {
            config_dir,
            secrets,
            include_stack: HashSet::new(),
        })
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = Mapping::new();
                for (k, v) in map {
                    let processed_key = self.process_value(k, source_path)?;
                    let processed_value = self.process_value(v, source_path)?;
                    result.insert(processed_key, processed_value);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => {
                let result: ConfigResult<Vec<Value>> = seq
                    .into_iter()
                    .map(|v| self.process_value(v, source_path))
                    .collect();
                Ok(Value::Sequence(result?))
            }
            _ => Ok(value),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        let value = tagged.value;

        trace!("Processing tag '{}' with value {:?}", tag, value);

        match tag.as_str() {
            "!include" => {
                let include_path = self.value_to_path(&value, source_path)?;
                debug!("Including file: {:?}", include_path);
                self.load_file(&include_path)
            }
            "!secret" => {
                let key = tag_argument(&value, "!secret", "secret key")?;
                let secret = self
                    .secrets
                    .get(key)
                    .ok_or_else(|| ConfigError::SecretNotFound {
                        key: key.to_string(),
                    })?;
                debug!("Substituted secret: {}", key);
                Ok(Value::String(secret.clone()))
            }
            "!env_var" => {
                let var = tag_argument(&value, "!env_var", "environment variable name")?;
                let env_value = std::env::var(var).map_err(|_| ConfigError::EnvVarNotFound {
                    var: var.to_string(),
                })?;
                Ok(Value::String(env_value))
            }
            _ => {
                let processed = self.process_value(value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }

    /// Convert a YAML value to a path, resolving relative to the source file
    fn value_to_path(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let path_str = value
            .as_str()
            .ok_or_else(|| ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            })?;

        let base_dir = source_path.parent().unwrap_or(&self.config_dir);
        if Path::new(path_str).is_absolute() {
            Ok(PathBuf::from(path_str))
        } else {
            Ok(base_dir.join(path_str))
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument<'a>(value: &'a Value, tag: &str, what: &str) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| ConfigError::InvalidValue {
        key: tag.to_string(),
        reason: format!("{} must be a string", what),
    })
}

/// Read `secrets.yaml`, stringifying scalar values
fn load_secrets(path: &Path) -> ConfigResult<HashMap<String, String>> {
    if !path.exists() {
        debug!("No secrets.yaml found at {:?}, using empty secrets", path);
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let raw: HashMap<String, Value> =
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })?;

    let secrets: HashMap<String, String> = raw
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => serde_yaml::to_string(&other)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            };
            (k, value)
        })
        .collect();

    debug!("Loaded {} secrets from {:?}", secrets.len(), path);
    Ok(secrets)
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_file(file)
}

/// Load the global configuration of a config directory
///
/// A missing `configuration.yaml` yields an empty mapping, as for a fresh
/// install. An empty file does too.
pub fn load_configuration(config_dir: impl AsRef<Path>) -> ConfigResult<Value> {
    let config_dir = config_dir.as_ref();
    if !config_dir.join(CONFIGURATION_FILE).exists() {
        debug!("No {} in {:?}", CONFIGURATION_FILE, config_dir);
        return Ok(Value::Mapping(Mapping::new()));
    }

    match load_yaml(config_dir, CONFIGURATION_FILE)? {
        Value::Null => Ok(Value::Mapping(Mapping::new())),
        value => Ok(value),
    }
}

/// Whether `key` is a top-level key of the global configuration
pub fn has_top_level_key(config: &Value, key: &str) -> bool {
    config
        .as_mapping()
        .map(|map| map.contains_key(key))
        .unwrap_or(false)
}
