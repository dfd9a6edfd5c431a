//! Provides definitions for loading and verifying [`Settings`] from a
//! [TOML][toml] file.
//!
//! Every key is optional; missing keys take their values from
//! [`Settings::default`]. Keys that are present must satisfy the constraints
//! laid out in [`settings_spec`], and keys not named there are rejected.
//!
//! ```toml
//! [integrate]
//! step = 0.01
//!
//! [validate]
//! tolerance = 0.001
//!
//! [sample]
//! max_x = 2.0
//! max_iters = 1000000
//! chunk_size = 1000
//! seed = 10546
//! stale = "clear"
//!
//! [histogram]
//! buckets = 20
//!
//! [curve]
//! end = 1.1
//! ```

use std::{
    collections::{ HashMap, HashSet },
    fmt,
    fs,
    iter::Peekable,
    path::Path,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use crate::settings::{
    Settings,
    StalePolicy,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config: invalid value for key '{0}': expected value to satisfy '{1}' but got {2}")]
    InvalidValue(String, String, String),

    #[error("config: encountered incompatible structure at '{0}'")]
    IncompatibleStructure(String),

    #[error("config: unknown key '{0}'")]
    UnknownKey(String),

    #[error("config: failed to convert type of value at key '{0}'")]
    FailedTypeConversion(String),

    #[error("config: couldn't read file '{0}'")]
    FileRead(String),

    #[error("config: couldn't parse file '{0}': {1}")]
    FileParse(String, String),

    #[error("config: couldn't parse string: {0}")]
    StrParse(String),
}
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Represents a constraint on the type and/or value of an item in a config.
pub trait ValueVerifier<V> {
    /// Return `true` if `value` matches the type specification, `false`
    /// otherwise.
    fn verify(&self, value: &V) -> bool;

    /// Return `value` if it matches the type specification, `err` otherwise.
    fn verify_ok_or<E>(&self, value: V, err: E) -> Result<V, E> {
        self.verify(&value).then_some(value).ok_or(err)
    }
}

#[derive(Clone, Debug)]
pub enum Verifier {
    /// A range of integer values
    IntRange {
        min: i64,
        max: i64,
        incl_min: bool,
        incl_max: bool,
    },

    /// A range of floating-point values; integers are accepted as well
    FloatRange {
        min: f64,
        max: f64,
        incl_min: bool,
        incl_max: bool,
    },

    /// A discrete collection of string values
    StrColl(HashSet<String>),
}

impl fmt::Display for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntRange { min, max, incl_min, incl_max } => {
                write!(f, "IntRange{}{}, {}{}",
                    if *incl_min { "[" } else { "(" },
                    min,
                    max,
                    if *incl_max { "]" } else { ")" },
                )
            },
            Self::FloatRange { min, max, incl_min, incl_max } => {
                write!(f, "FloatRange{}{}, {}{}",
                    if *incl_min { "[" } else { "(" },
                    min,
                    max,
                    if *incl_max { "]" } else { ")" },
                )
            },
            Self::StrColl(coll) => {
                let mut items: Vec<&str>
                    = coll.iter().map(|s| s.as_ref()).collect();
                items.sort_unstable();
                write!(f, "StrCollection{{{}}}", items.join(", "))?;
                Ok(())
            },
        }
    }
}

fn in_range<T>(x: T, min: T, max: T, incl_min: bool, incl_max: bool) -> bool
where T: PartialOrd
{
    let in_min: bool = if incl_min { x >= min } else { x > min };
    let in_max: bool = if incl_max { x <= max } else { x < max };
    in_min && in_max
}

impl ValueVerifier<toml::Value> for Verifier {
    fn verify(&self, value: &toml::Value) -> bool {
        use toml::Value;

        match (self, value) {
            (
                Self::IntRange { min, max, incl_min, incl_max },
                Value::Integer(i),
            ) => in_range(*i, *min, *max, *incl_min, *incl_max),
            (
                Self::FloatRange { min, max, incl_min, incl_max },
                Value::Float(f),
            ) => in_range(*f, *min, *max, *incl_min, *incl_max),
            (
                Self::FloatRange { min, max, incl_min, incl_max },
                Value::Integer(i),
            ) => in_range(*i as f64, *min, *max, *incl_min, *incl_max),
            (Self::StrColl(coll), Value::String(s)) => coll.contains(s),
            _ => false,
        }
    }
}

/// An item in a config specification, either a type/value specification for
/// single values or a set of specifications for a sub-table.
#[derive(Clone, Debug)]
pub enum ConfigSpecItem {
    Value(Verifier),
    Table(ConfigSpec),
}

impl From<Verifier> for ConfigSpecItem {
    fn from(ver: Verifier) -> Self { Self::Value(ver) }
}

impl From<ConfigSpec> for ConfigSpecItem {
    fn from(confspec: ConfigSpec) -> Self { Self::Table(confspec) }
}

/// Sugared [`HashMap`] representing a specification for the values and
/// structure of a config file.
#[derive(Clone, Debug, Default)]
pub struct ConfigSpec {
    spec: HashMap<String, ConfigSpecItem>,
}

impl FromIterator<(String, ConfigSpecItem)> for ConfigSpec {
    fn from_iter<I>(iter: I) -> Self
    where I: IntoIterator<Item = (String, ConfigSpecItem)>
    {
        Self { spec: iter.into_iter().collect() }
    }
}

impl ConfigSpec {
    /// Verify a parsed table against `self`, producing a [`TomlConfig`] if it
    /// passes inspection.
    ///
    /// Keys absent from `table` are skipped; keys absent from `self` are an
    /// error.
    pub fn verify(&self, table: toml::Table) -> ConfigResult<TomlConfig> {
        let data: toml::Table = self.verify_table(table, "")?;
        Ok(TomlConfig { data })
    }

    fn verify_table(&self, mut tab: toml::Table, prefix: &str)
        -> ConfigResult<toml::Table>
    {
        use toml::Value;

        let keypath = |key: &str| -> String {
            if prefix.is_empty() { key.to_string() } else { format!("{}.{}", prefix, key) }
        };
        let mut data = toml::Table::new();
        for (key, spec_item) in self.spec.iter() {
            let val: Value
                = match (spec_item, tab.remove(key)) {
                    (ConfigSpecItem::Table(subspec), Some(Value::Table(sub))) => {
                        Value::Table(subspec.verify_table(sub, &keypath(key))?)
                    },
                    (ConfigSpecItem::Table(_), Some(_)) => {
                        return Err(
                            ConfigError::IncompatibleStructure(keypath(key)));
                    },
                    (ConfigSpecItem::Value(ver), Some(v)) => {
                        let valstr: String = v.to_string();
                        ver.verify_ok_or(
                            v,
                            ConfigError::InvalidValue(
                                keypath(key),
                                ver.to_string(),
                                valstr,
                            )
                        )?
                    },
                    (_, None) => { continue; },
                };
            data.insert(key.clone(), val);
        }
        if let Some(extra) = tab.keys().min() {
            return Err(ConfigError::UnknownKey(keypath(extra)));
        }
        Ok(data)
    }
}

/// Build a [`ConfigSpec`] or one of its items.
///
/// Ranges are written as `(min, max)`, with a `=` placed on the side(s) where
/// the bound is inclusive.
#[macro_export]
macro_rules! confspec {
    ( IntRange { =( $min:expr, $max:expr )= } ) => {
        $crate::config::Verifier::IntRange {
            min: $min,
            max: $max,
            incl_min: true,
            incl_max: true,
        }
        .into()
    };
    ( FloatRange { ( $min:expr, $max:expr ) } ) => {
        $crate::config::Verifier::FloatRange {
            min: $min,
            max: $max,
            incl_min: false,
            incl_max: false,
        }
        .into()
    };
    ( FloatRange { ( $min:expr, $max:expr )= } ) => {
        $crate::config::Verifier::FloatRange {
            min: $min,
            max: $max,
            incl_min: false,
            incl_max: true,
        }
        .into()
    };
    ( StrColl { $( $s:expr ),* $(,)? } ) => {
        $crate::config::Verifier::StrColl(
            std::collections::HashSet::from_iter([$( $s.to_string() ),*])
        )
        .into()
    };
    ( Table { $( $key:expr => $spec:expr ),* $(,)? } ) => {
        $crate::config::ConfigSpec::from_iter([
            $( ($key.to_string(), $spec) ),*
        ])
        .into()
    };
    ( { $( $key:expr => $spec:expr ),* $(,)? } ) => {
        $crate::config::ConfigSpec::from_iter([
            $( ($key.to_string(), $spec) ),*
        ])
    };
}

/// Key-path access into a nested map-like structure where string keys are
/// mapped to `Self::Value`.
///
/// Key paths are either iterables of `&str` keys, each accessing a single
/// nested level in the structure, or a single `&str` containing the items of
/// the path delimited by `Self::DELIM`.
pub trait InternalRecord {
    /// Record value type.
    type Value;

    /// Assumed key path delimiter.
    const DELIM: char;

    /// Get a reference to the value at the end of a key path, if it exists.
    fn get_path<'a, K>(&self, keys: K) -> Option<&Self::Value>
    where K: IntoIterator<Item = &'a str>;

    /// Get a reference to the value at the end of a key path, if it exists.
    fn get(&self, keypath: &str) -> Option<&Self::Value> {
        self.get_path(keypath.split(Self::DELIM))
    }
}

impl InternalRecord for toml::Table {
    type Value = toml::Value;
    const DELIM: char = '.';

    fn get_path<'a, K>(&self, keys: K) -> Option<&Self::Value>
    where K: IntoIterator<Item = &'a str>
    {
        fn table_get_path<'a, K>(
            table: &toml::Table,
            mut keys: Peekable<K>,
        ) -> Option<&toml::Value>
        where K: Iterator<Item = &'a str>
        {
            if let Some(key) = keys.next() {
                match (table.get(key), keys.peek()) {
                    (Some(toml::Value::Table(subtab)), Some(_)) => {
                        table_get_path(subtab, keys)
                    },
                    (x, None) => x,
                    (Some(_), Some(_)) => None,
                    (None, _) => None,
                }
            } else {
                None
            }
        }
        table_get_path(self, keys.into_iter().peekable())
    }
}

/// A verified TOML table.
#[derive(Clone, Debug, Default)]
pub struct TomlConfig {
    data: toml::Table,
}

impl TomlConfig {
    /// Load config values from a file.
    pub fn from_file<P>(infile: P, spec: &ConfigSpec) -> ConfigResult<Self>
    where P: AsRef<Path>
    {
        let infile_str: String = infile.as_ref().display().to_string();
        let table: toml::Table
            = fs::read_to_string(infile)
            .map_err(|_| ConfigError::FileRead(infile_str.clone()))
            .and_then(|s| {
                toml::from_str(&s)
                    .map_err(|e| {
                        ConfigError::FileParse(infile_str.clone(), e.to_string())
                    })
            })?;
        debug!(file = %infile_str, "read config");
        spec.verify(table)
    }

    /// Load config values from a string.
    pub fn from_str(s: &str, spec: &ConfigSpec) -> ConfigResult<Self> {
        let table: toml::Table
            = toml::from_str(s)
            .map_err(|e| ConfigError::StrParse(e.to_string()))?;
        spec.verify(table)
    }

    /// Get a reference to the value at the end of a key path.
    pub fn get(&self, keypath: &str) -> Option<&toml::Value> {
        InternalRecord::get(&self.data, keypath)
    }

    /// Convert the value at the end of a key path to a new type if it exists.
    pub fn get_into<'de, U>(&self, keypath: &str) -> Option<ConfigResult<U>>
    where U: Deserialize<'de>
    {
        self.get(keypath)
            .map(|v| {
                v.clone().try_into()
                    .map_err(|_| {
                        ConfigError::FailedTypeConversion(keypath.to_string())
                    })
            })
    }
}

/// Constraints on every key a settings file may contain.
pub fn settings_spec() -> ConfigSpec {
    confspec!({
        "integrate" => confspec!(Table {
            "step" => confspec!(FloatRange { (0.0, 1.0)= }),
        }),
        "validate" => confspec!(Table {
            "tolerance" => confspec!(FloatRange { (0.0, 1.0) }),
        }),
        "sample" => confspec!(Table {
            "max_x" => confspec!(FloatRange { (1.0, 1e6)= }),
            "max_iters" => confspec!(IntRange { =(1, 1_000_000_000)= }),
            "chunk_size" => confspec!(IntRange { =(1, 1_000_000_000)= }),
            "seed" => confspec!(IntRange { =(0, i64::MAX)= }),
            "stale" => confspec!(StrColl { "keep", "clear", "filter" }),
        }),
        "histogram" => confspec!(Table {
            "buckets" => confspec!(IntRange { =(1, 1_000_000)= }),
        }),
        "curve" => confspec!(Table {
            "end" => confspec!(FloatRange { (0.0, 1e3)= }),
        }),
    })
}

impl Settings {
    /// Read settings out of a verified config, taking defaults for anything
    /// missing.
    pub fn from_config(config: &TomlConfig) -> ConfigResult<Self> {
        let def = Self::default();
        let stale: StalePolicy
            = match config.get_into::<String>("sample.stale").transpose()? {
                Some(name) => name.parse()
                    .map_err(|_| {
                        ConfigError::InvalidValue(
                            "sample.stale".to_string(),
                            "keep | clear | filter".to_string(),
                            name.clone(),
                        )
                    })?,
                None => def.stale,
            };
        let settings = Self {
            step: config.get_into("integrate.step").transpose()?
                .unwrap_or(def.step),
            tolerance: config.get_into("validate.tolerance").transpose()?
                .unwrap_or(def.tolerance),
            max_x: config.get_into("sample.max_x").transpose()?
                .unwrap_or(def.max_x),
            max_iters: config.get_into("sample.max_iters").transpose()?
                .unwrap_or(def.max_iters),
            chunk_size: config.get_into("sample.chunk_size").transpose()?
                .unwrap_or(def.chunk_size),
            seed: config.get_into("sample.seed").transpose()?.or(def.seed),
            stale,
            buckets: config.get_into("histogram.buckets").transpose()?
                .unwrap_or(def.buckets),
            curve_end: config.get_into("curve.end").transpose()?
                .unwrap_or(def.curve_end),
        };
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file<P>(infile: P) -> ConfigResult<Self>
    where P: AsRef<Path>
    {
        Self::from_config(&TomlConfig::from_file(infile, &settings_spec())?)
    }

    /// Load settings from a TOML string.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Self::from_config(&TomlConfig::from_str(s, &settings_spec())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
    }

    #[test]
    fn every_key_is_read() {
        let s = r#"
            [integrate]
            step = 0.001

            [validate]
            tolerance = 1e-4

            [sample]
            max_x = 3
            max_iters = 5000
            chunk_size = 250
            seed = 10546
            stale = "filter"

            [histogram]
            buckets = 50

            [curve]
            end = 1.5
        "#;
        let settings = Settings::from_toml_str(s).unwrap();
        assert_eq!(
            settings,
            Settings {
                step: 0.001,
                tolerance: 1e-4,
                max_x: 3.0,
                max_iters: 5000,
                chunk_size: 250,
                seed: Some(10546),
                stale: StalePolicy::Filter,
                buckets: 50,
                curve_end: 1.5,
            },
        );
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let settings = Settings::from_toml_str("[sample]\nseed = 3\n").unwrap();
        assert_eq!(settings.seed, Some(3));
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.step, 0.01);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for s in [
            "[integrate]\nstep = 0.0",
            "[integrate]\nstep = 2.0",
            "[histogram]\nbuckets = 0",
            "[sample]\nstale = \"sometimes\"",
            "[sample]\nchunk_size = \"many\"",
            "[sample]\nmax_x = 0.5",
        ] {
            assert!(
                matches!(Settings::from_toml_str(s), Err(ConfigError::InvalidValue(..))),
                "accepted {:?}", s,
            );
        }
    }

    #[test]
    fn unknown_keys_are_rejected() {
        match Settings::from_toml_str("[sample]\nseeed = 3\n") {
            Err(ConfigError::UnknownKey(key)) => assert_eq!(key, "sample.seeed"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(matches!(
            Settings::from_toml_str("verbose = true"),
            Err(ConfigError::UnknownKey(_)),
        ));
        assert!(matches!(
            Settings::from_toml_str("sample = 5"),
            Err(ConfigError::IncompatibleStructure(_)),
        ));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            Settings::from_toml_str("[sample"),
            Err(ConfigError::StrParse(_)),
        ));
        assert!(matches!(
            Settings::from_file("/nonexistent/pdfsample.toml"),
            Err(ConfigError::FileRead(_)),
        ));
    }

    #[test]
    fn key_paths_reach_nested_values() {
        let config
            = TomlConfig::from_str("[sample]\nseed = 7\n", &settings_spec())
            .unwrap();
        assert_eq!(config.get("sample.seed"), Some(&toml::Value::Integer(7)));
        assert_eq!(config.get("sample.seed.x"), None);
        assert_eq!(config.get("histogram.buckets"), None);
        assert_eq!(config.get_into::<u64>("sample.seed").unwrap().unwrap(), 7);
        assert!(matches!(
            config.get_into::<String>("sample.seed"),
            Some(Err(ConfigError::FailedTypeConversion(_))),
        ));
    }

    #[test]
    fn verifiers_display_their_constraints() {
        let ver = Verifier::FloatRange {
            min: 0.0, max: 1.0, incl_min: false, incl_max: true };
        assert_eq!(ver.to_string(), "FloatRange(0, 1]");
        let coll = Verifier::StrColl(
            HashSet::from_iter(["b".to_string(), "a".to_string()]));
        assert_eq!(coll.to_string(), "StrCollection{a, b}");
    }
}
