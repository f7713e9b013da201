//! YAML document I/O for configuration files.
//!
//! Documents go through [`YamlValue`] first, so an empty or comment-only file
//! deserializes as an empty mapping and every serde default applies.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

pub use serde_yaml::Value as YamlValue;

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("Reading YAML file {path:?}"))?;
    from_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}

pub fn from_str<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let value = match serde_yaml::from_str::<YamlValue>(raw)? {
        YamlValue::Null => YamlValue::Mapping(Default::default()),
        value => value,
    };
    Ok(serde_yaml::from_value(value)?)
}

pub fn save_to_path<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    fs::write(path, to_string(data)?).with_context(|| format!("Writing YAML file {path:?}"))
}

pub fn to_string<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_yaml::to_string(value)?)
}
