//! Parameter maps passed to the processing algorithms.
//!
//! Algorithms are addressed by name and receive their inputs as a flat
//! mapping from parameter names to loosely typed values, mirroring the
//! engine's own conventions (`INPUT`, `OUTPUT`, `NODATA`, ...). The typed
//! accessors report missing or badly typed entries as user errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const OUTPUT_KEY: &str = "OUTPUT";
pub const OUTPUT_KEY_LOWER: &str = "output";

#[derive(Clone, Debug, PartialEq, Default)]
pub enum ParamValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Path(PathBuf),
    List(Vec<ParamValue>),
}

impl ParamValue {
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            ParamValue::Path(v) => Some(v.as_path()),
            ParamValue::Str(v) => Some(Path::new(v)),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ParamValue::None)
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParamValue::None => f.write_str("None"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Str(v) => write!(f, "'{v}'"),
            ParamValue::Path(v) => write!(f, "'{}'", v.to_string_lossy()),
            ParamValue::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<&Path> for ParamValue {
    fn from(v: &Path) -> Self {
        ParamValue::Path(v.to_path_buf())
    }
}

impl From<PathBuf> for ParamValue {
    fn from(v: PathBuf) -> Self {
        ParamValue::Path(v)
    }
}

impl From<Vec<ParamValue>> for ParamValue {
    fn from(v: Vec<ParamValue>) -> Self {
        ParamValue::List(v)
    }
}

impl From<crate::Extent> for ParamValue {
    fn from(v: crate::Extent) -> Self {
        ParamValue::List(v.iter().map(|&c| ParamValue::Float(c)).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => ParamValue::None,
        }
    }
}

/// Named parameters of a single algorithm invocation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Parameters {
    values: BTreeMap<String, ParamValue>,
}

impl Parameters {
    pub fn new() -> Self {
        Parameters::default()
    }

    pub fn set(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_none())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key).filter(|v| !v.is_none())
    }

    fn required(&self, key: &str) -> Result<&ParamValue> {
        self.get(key)
            .ok_or_else(|| Error::InvalidInput(format!("Missing required parameter '{key}'")))
    }

    pub fn string(&self, key: &str) -> Result<&str> {
        self.required(key)?
            .as_str()
            .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a string")))
    }

    pub fn opt_string(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a string"))),
        }
    }

    pub fn float(&self, key: &str) -> Result<f64> {
        self.required(key)?
            .as_float()
            .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a number")))
    }

    pub fn opt_float(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_float()
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a number"))),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64> {
        self.required(key)?
            .as_int()
            .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not an integer")))
    }

    pub fn opt_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_int()
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not an integer"))),
        }
    }

    /// Missing boolean parameters read as false
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(ParamValue::Bool(v)) => Ok(*v),
            Some(_) => Err(Error::InvalidInput(format!("Parameter '{key}' is not a boolean"))),
        }
    }

    pub fn path(&self, key: &str) -> Result<&Path> {
        self.required(key)?
            .as_path()
            .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a path")))
    }

    pub fn opt_path(&self, key: &str) -> Result<Option<&Path>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_path()
                .map(Some)
                .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a path"))),
        }
    }

    pub fn list(&self, key: &str) -> Result<&[ParamValue]> {
        match self.required(key)? {
            ParamValue::List(values) => Ok(values),
            _ => Err(Error::InvalidInput(format!("Parameter '{key}' is not a list"))),
        }
    }

    pub fn opt_extent(&self, key: &str) -> Result<Option<crate::Extent>> {
        match self.get(key) {
            None => Ok(None),
            Some(ParamValue::List(values)) if values.len() == 4 => {
                let mut extent = [0.0; 4];
                for (slot, value) in extent.iter_mut().zip(values) {
                    *slot = value
                        .as_float()
                        .ok_or_else(|| Error::InvalidInput(format!("Parameter '{key}' is not a numeric extent")))?;
                }
                Ok(Some(extent))
            }
            Some(_) => Err(Error::InvalidInput(format!(
                "Parameter '{key}' is not an [xmin, ymin, xmax, ymax] extent"
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl std::fmt::Display for Parameters {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("{ ")?;
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str(" }")
    }
}

/// Named results of an algorithm invocation, by convention the primary
/// artifact sits under `OUTPUT` (or legacy lowercase `output`)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, ParamValue>,
}

impl Outputs {
    pub fn new() -> Self {
        Outputs::default()
    }

    pub fn single(value: impl Into<ParamValue>) -> Self {
        let mut outputs = Outputs::new();
        outputs.insert(OUTPUT_KEY, value);
        outputs
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    /// The conventional primary output entry, if the algorithm produced one
    pub fn primary(&self) -> Option<&ParamValue> {
        self.values.get(OUTPUT_KEY).or_else(|| self.values.get(OUTPUT_KEY_LOWER))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_report_user_errors() {
        let params = Parameters::new()
            .set("INPUT", Path::new("/data/in.tif"))
            .set("NODATA", -9999.0)
            .set("BAND", 1)
            .set("ALL_TOUCH", true)
            .set("MODE", "near");

        assert_eq!(params.path("INPUT").unwrap(), Path::new("/data/in.tif"));
        assert_eq!(params.float("NODATA").unwrap(), -9999.0);
        assert_eq!(params.int("BAND").unwrap(), 1);
        assert!(params.flag("ALL_TOUCH").unwrap());
        assert!(!params.flag("INVERT").unwrap());
        assert_eq!(params.string("MODE").unwrap(), "near");

        assert!(matches!(params.float("MODE"), Err(Error::InvalidInput(_))));
        assert!(matches!(params.string("MISSING"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn none_values_count_as_absent() {
        let params = Parameters::new().set("FIELD", Option::<&str>::None);
        assert!(!params.contains("FIELD"));
        assert_eq!(params.opt_string("FIELD").unwrap(), None);
    }

    #[test]
    fn extent_accessor() {
        let params = Parameters::new().set("EXTENT", [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(params.opt_extent("EXTENT").unwrap(), Some([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(params.opt_extent("MISSING").unwrap(), None);

        let bad = Parameters::new().set("EXTENT", "1,2,3,4");
        assert!(bad.opt_extent("EXTENT").is_err());
    }

    #[test]
    fn primary_output_prefers_the_uppercase_key() {
        let mut outputs = Outputs::new();
        outputs.insert("output", "legacy");
        outputs.insert("OUTPUT", "primary");
        assert_eq!(outputs.primary().and_then(ParamValue::as_str), Some("primary"));

        let legacy_only = {
            let mut outputs = Outputs::new();
            outputs.insert("output", "legacy");
            outputs
        };
        assert_eq!(legacy_only.primary().and_then(ParamValue::as_str), Some("legacy"));
    }
}
