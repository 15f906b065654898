//! Configuration module
//!
//! This module provides the configuration records consumed when constructing a
//! storage or a storage hub: per-bucket records, the filesystem storage facets
//! (root path, base URL, permission mode) and the ordered list of hub members.
//!
//! Records can be loaded from JSON (files or strings) or, for a single
//! filesystem storage, from environment variables.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::storage_types::StorageBackend;

/// Permission applied to created files and directories when none is configured (rwxr-xr-x).
pub const DEFAULT_FILE_PERMISSION: u32 = 0o755;

const MAX_FILE_PERMISSION: u32 = 0o7777;

/// Configuration record of a single bucket.
///
/// Every field is optional: a bucket registered by bare name gets the default
/// record. Backend-specific keys end up in `extra` and are validated by the
/// bucket implementation that consumes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    /// Bucket class; the owning storage's default class is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    /// Sub path below the storage root. Defaults to the bucket name.
    #[serde(
        default,
        alias = "base_sub_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_sub_path: Option<String>,

    /// Template for the per-file sub directories, e.g. `{^name}/{^^name}`.
    #[serde(
        default,
        alias = "file_sub_dir_template",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_sub_dir_template: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BucketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_base_sub_path(mut self, base_sub_path: impl Into<String>) -> Self {
        self.base_sub_path = Some(base_sub_path.into());
        self
    }

    pub fn with_file_sub_dir_template(mut self, template: impl Into<String>) -> Self {
        self.file_sub_dir_template = Some(template.into());
        self
    }

    /// Build a record from untyped data.
    ///
    /// `null` yields the default record; anything other than a JSON object
    /// (a scalar or a list) is rejected with `InvalidArgument`.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => serde_json::from_value(value).map_err(|e| {
                ConfigError::InvalidArgument(format!("Malformed bucket configuration: {}", e))
            }),
            other => Err(ConfigError::InvalidArgument(format!(
                "Data of the bucket should be a configuration record, got {}",
                json_kind(&other)
            ))),
        }
    }
}

/// Ordered set of bucket records keyed by bucket name.
///
/// Deserializes from a JSON object (`{"name": {...}}`) or from a plain list of
/// bare names (`["name", ...]`), which get empty records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BucketsConfig(Vec<(String, BucketConfig)>);

impl BucketsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut buckets = Self::new();
        for name in names {
            buckets.insert(name, BucketConfig::default());
        }
        buckets
    }

    pub fn with(mut self, name: impl Into<String>, config: BucketConfig) -> Self {
        self.insert(name, config);
        self
    }

    /// Insert a record, replacing an existing one of the same name in place.
    pub fn insert(&mut self, name: impl Into<String>, config: BucketConfig) {
        let name = name.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = config,
            None => self.0.push((name, config)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BucketConfig> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, config)| config)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BucketConfig)> {
        self.0.iter().map(|(name, config)| (name.as_str(), config))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let mut buckets = Self::new();
        match value {
            Value::Null => {}
            Value::Object(map) => {
                for (name, data) in map {
                    buckets.insert(name, BucketConfig::from_value(data)?);
                }
            }
            Value::Array(entries) => {
                for entry in entries {
                    match entry {
                        Value::String(name) => buckets.insert(name, BucketConfig::default()),
                        other => {
                            return Err(ConfigError::InvalidArgument(format!(
                                "Name of the bucket should be a string, got {}",
                                json_kind(&other)
                            )))
                        }
                    }
                }
            }
            other => {
                return Err(ConfigError::InvalidArgument(format!(
                    "Buckets should be a map of records or a list of names, got {}",
                    json_kind(&other)
                )))
            }
        }
        Ok(buckets)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }
}

impl IntoIterator for BucketsConfig {
    type Item = (String, BucketConfig);
    type IntoIter = std::vec::IntoIter<(String, BucketConfig)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'de> Deserialize<'de> for BucketsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        BucketsConfig::from_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for BucketsConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, config) in &self.0 {
            map.serialize_entry(name, config)?;
        }
        map.end()
    }
}

/// Filesystem storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemStorageConfig {
    /// Root directory shared by all buckets (e.g. "/var/lib/coffer/files")
    #[serde(alias = "base_path")]
    pub base_path: PathBuf,

    /// Base URL prepended to every file URL (e.g. "http://localhost:3000/files")
    #[serde(default, alias = "base_url")]
    pub base_url: String,

    /// Mode applied to every created file and directory.
    /// Accepts an integer or an octal string such as "0755".
    #[serde(
        default = "default_file_permission",
        alias = "file_permission",
        deserialize_with = "deserialize_permission"
    )]
    pub file_permission: u32,

    #[serde(
        default,
        alias = "bucket_class_name",
        skip_serializing_if = "Option::is_none"
    )]
    pub bucket_class_name: Option<String>,

    #[serde(default)]
    pub buckets: BucketsConfig,
}

impl FileSystemStorageConfig {
    pub fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            base_url: base_url.into(),
            file_permission: DEFAULT_FILE_PERMISSION,
            bucket_class_name: None,
            buckets: BucketsConfig::default(),
        }
    }

    pub fn with_file_permission(mut self, file_permission: u32) -> Self {
        self.file_permission = file_permission;
        self
    }

    pub fn with_buckets(mut self, buckets: BucketsConfig) -> Self {
        self.buckets = buckets;
        self
    }

    /// Load the configuration from the environment (and a `.env` file, if present).
    ///
    /// * `COFFER_BASE_PATH` - root directory (required)
    /// * `COFFER_BASE_URL` - base URL for file links
    /// * `COFFER_FILE_PERMISSION` - octal mode, defaults to 0755
    /// * `COFFER_BUCKET_CLASS` - default bucket class
    /// * `COFFER_BUCKETS` - JSON map of bucket records or list of bucket names
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let base_path = env::var("COFFER_BASE_PATH")
            .map_err(|_| anyhow::anyhow!("COFFER_BASE_PATH must be set"))?;
        let base_url = env::var("COFFER_BASE_URL").unwrap_or_default();

        let file_permission = match env::var("COFFER_FILE_PERMISSION") {
            Ok(raw) => parse_permission(&raw)?,
            Err(_) => DEFAULT_FILE_PERMISSION,
        };

        let buckets = match env::var("COFFER_BUCKETS") {
            Ok(raw) => BucketsConfig::from_json_str(&raw)
                .map_err(|e| anyhow::anyhow!("COFFER_BUCKETS is invalid: {}", e))?,
            Err(_) => BucketsConfig::default(),
        };

        let config = Self {
            base_path: PathBuf::from(base_path),
            base_url,
            file_permission,
            bucket_class_name: env::var("COFFER_BUCKET_CLASS").ok(),
            buckets,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Storage base path must not be empty"));
        }

        if self.file_permission > MAX_FILE_PERMISSION {
            return Err(anyhow::anyhow!(
                "File permission {:o} is out of range",
                self.file_permission
            ));
        }

        if let Some(class) = &self.bucket_class_name {
            if class.trim().is_empty() {
                return Err(anyhow::anyhow!("Bucket class name must not be empty"));
            }
        }

        Ok(())
    }
}

/// Storage configuration record, tagged by its `class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum StorageConfig {
    #[serde(rename = "filesystem")]
    FileSystem(FileSystemStorageConfig),

    #[serde(rename = "hub")]
    Hub(HubConfig),
}

impl StorageConfig {
    pub fn backend(&self) -> StorageBackend {
        match self {
            StorageConfig::FileSystem(_) => StorageBackend::FileSystem,
            StorageConfig::Hub(_) => StorageBackend::Hub,
        }
    }

    /// Load a storage record from the environment (and a `.env` file, if present).
    ///
    /// * `COFFER_STORAGE_CLASS` - `filesystem` (default) or `hub`
    /// * `COFFER_HUB_CONFIG` - path of the JSON hub configuration, for `hub`
    ///
    /// The filesystem class reads the variables of [`FileSystemStorageConfig::from_env`].
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let backend = match env::var("COFFER_STORAGE_CLASS") {
            Ok(raw) => raw.parse::<StorageBackend>()?,
            Err(_) => StorageBackend::FileSystem,
        };

        match backend {
            StorageBackend::FileSystem => {
                Ok(StorageConfig::FileSystem(FileSystemStorageConfig::from_env()?))
            }
            StorageBackend::Hub => {
                let path = env::var("COFFER_HUB_CONFIG").map_err(|_| {
                    anyhow::anyhow!("COFFER_HUB_CONFIG must be set for the hub storage class")
                })?;
                Ok(StorageConfig::Hub(HubConfig::from_json_file(path)?))
            }
        }
    }

    /// Build a record from untyped data; scalars, lists and empty records are rejected.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let is_record = matches!(&value, Value::Object(map) if !map.is_empty());
        if !is_record {
            return Err(ConfigError::InvalidArgument(format!(
                "Data of the storage should be a storage object or a non-empty configuration record, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| {
            ConfigError::InvalidArgument(format!("Malformed storage configuration: {}", e))
        })
    }
}

/// One member of a hub: a storage record plus the name it is registered under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedStorageConfig {
    pub name: String,
    #[serde(flatten)]
    pub config: StorageConfig,
}

/// Storage hub configuration. Member order is significant: the first member is
/// the default storage and bucket lookups scan members in this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub storages: Vec<NamedStorageConfig>,
}

impl HubConfig {
    pub fn with_storage(mut self, name: impl Into<String>, config: StorageConfig) -> Self {
        self.storages.push(NamedStorageConfig {
            name: name.into(),
            config,
        });
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read hub configuration {}: {}", path.display(), e)
        })?;
        let config = Self::from_json_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for member in &self.storages {
            if member.name.trim().is_empty() {
                return Err(anyhow::anyhow!("Storage name must not be empty"));
            }
            match &member.config {
                StorageConfig::FileSystem(config) => config.validate()?,
                StorageConfig::Hub(config) => config.validate()?,
            }
        }
        Ok(())
    }
}

fn default_file_permission() -> u32 {
    DEFAULT_FILE_PERMISSION
}

/// Parse an octal permission string such as "0755", "755" or "0o755".
pub fn parse_permission(raw: &str) -> Result<u32, ConfigError> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| {
        ConfigError::Invalid(format!("File permission '{}' is not an octal mode", raw))
    })?;
    if mode > MAX_FILE_PERMISSION {
        return Err(ConfigError::Invalid(format!(
            "File permission '{}' is out of range",
            raw
        )));
    }
    Ok(mode)
}

fn deserialize_permission<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    struct PermissionVisitor;

    impl de::Visitor<'_> for PermissionVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer mode or an octal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v)
                .ok()
                .filter(|mode| *mode <= MAX_FILE_PERMISSION)
                .ok_or_else(|| E::custom(format!("file permission {} is out of range", v)))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
            u64::try_from(v)
                .map_err(|_| E::custom("file permission must not be negative"))
                .and_then(|v| self.visit_u64(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
            parse_permission(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(PermissionVisitor)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}
