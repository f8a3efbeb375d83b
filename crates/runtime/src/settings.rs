use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use validation::{Error, Errors, Scope, SUGGEST_DISTANCE};

/// The environment variable prefix of every setting.
pub const ENV_PREFIX: &str = "STREAMLET_";

/// ExecutionPool selects how fires are scheduled onto workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPool {
    /// Distinct tasks, and distinct fires of one task, may run
    /// concurrently.
    #[default]
    Parallel,
    /// One fire at a time across the whole flow; intended for debugging.
    Serial,
}

impl FromStr for ExecutionPool {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(ExecutionPool::Parallel),
            "serial" => Ok(ExecutionPool::Serial),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ExecutionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            ExecutionPool::Parallel => "parallel",
            ExecutionPool::Serial => "serial",
        })
    }
}

/// Settings is the flat map of typed runtime switches, read-only once the
/// flow starts.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Log verbosity: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace.
    pub log_level: i64,
    pub only_validate: bool,
    pub run_once: bool,
    pub print_config: bool,
    pub print_traceback: bool,
    pub disable_outputs: bool,
    pub disable_default: bool,
    pub execution_pool: ExecutionPool,
    pub disable_readiness_probe: bool,
    pub skip_disabled_validation: bool,
    pub allow_none_metric: bool,
    pub nested_attr_seperator: String,
    pub timezone: chrono_tz::Tz,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: 2,
            only_validate: false,
            run_once: false,
            print_config: false,
            print_traceback: false,
            disable_outputs: false,
            disable_default: false,
            execution_pool: ExecutionPool::Parallel,
            disable_readiness_probe: false,
            skip_disabled_validation: false,
            allow_none_metric: false,
            nested_attr_seperator: ".".to_string(),
            timezone: chrono_tz::UTC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Bool,
    Int,
    Str,
    Pool,
    Timezone,
}

impl Kind {
    fn expected(&self) -> &'static str {
        match self {
            Kind::Bool => "boolean",
            Kind::Int => "integer",
            Kind::Str => "string",
            Kind::Pool => "\"parallel\" or \"serial\"",
            Kind::Timezone => "IANA timezone name",
        }
    }
}

/// The declared settings table: every recognized name and its kind.
const KNOWN: &[(&str, Kind)] = &[
    ("log_level", Kind::Int),
    ("only_validate", Kind::Bool),
    ("run_once", Kind::Bool),
    ("print_config", Kind::Bool),
    ("print_traceback", Kind::Bool),
    ("disable_outputs", Kind::Bool),
    ("disable_default", Kind::Bool),
    ("execution_pool", Kind::Pool),
    ("disable_readiness_probe", Kind::Bool),
    ("skip_disabled_validation", Kind::Bool),
    ("allow_none_metric", Kind::Bool),
    ("nested_attr_seperator", Kind::Str),
    ("timezone", Kind::Timezone),
];

/// The source layer a setting value arrived from. Command-line and
/// environment layers are resolved before the configuration is read, and
/// cannot be overridden by `flow.settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsLayer {
    CommandLine,
    Environment,
    Config,
}

/// SettingsBuilder merges the three settings sources with fixed precedence
/// (command line, then environment, then `flow.settings`), type-checking
/// each value against the declared table.
pub struct SettingsBuilder {
    settings: Settings,
    fixed: BTreeSet<&'static str>,
    errors: Errors,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
            fixed: BTreeSet::new(),
            errors: Errors::new(),
        }
    }

    /// Apply one setting from the given layer. Unknown names and ill-typed
    /// values are recorded as errors; lower-precedence layers cannot
    /// overwrite values fixed by higher ones.
    pub fn apply(&mut self, name: &str, value: &Value, layer: SettingsLayer) {
        let root = Scope::root();
        let scope = match layer {
            SettingsLayer::Config => root.push_prop("flow"),
            _ => root,
        };
        let scope = match layer {
            SettingsLayer::Config => scope.push_prop("settings"),
            _ => scope,
        };

        let Some((known_name, kind)) = KNOWN
            .iter()
            .find(|(known, _)| *known == name)
            .copied()
        else {
            let error = match closest(name) {
                Some(suggest) => Error::UnknownSettingSuggest {
                    name: name.to_string(),
                    suggest: suggest.to_string(),
                },
                None => Error::UnknownSetting {
                    name: name.to_string(),
                },
            };
            self.errors.push(scope.push_prop(name), error);
            return;
        };

        if self.fixed.contains(known_name) {
            return;
        }
        if layer != SettingsLayer::Config {
            self.fixed.insert(known_name);
        }

        if let Err(error) = self.store(known_name, kind, value) {
            self.errors.push(scope.push_prop(name), error);
        }
    }

    /// Apply every `STREAMLET_<NAME>` environment variable.
    pub fn apply_env(&mut self) {
        for (name, _) in KNOWN {
            let variable = format!("{ENV_PREFIX}{}", name.to_uppercase());
            let Ok(raw) = std::env::var(&variable) else {
                continue;
            };
            let value = parse_env(&raw);
            self.apply(name, &value, SettingsLayer::Environment);
        }
    }

    /// Apply the `flow.settings` map of a validated configuration.
    pub fn apply_config(&mut self, settings: &BTreeMap<String, Value>) {
        for (name, value) in settings {
            self.apply(name, value, SettingsLayer::Config);
        }
    }

    /// The settings as resolved so far. Used for the switches which gate
    /// loading and validation themselves, before `flow.settings` exists.
    pub fn current(&self) -> &Settings {
        &self.settings
    }

    pub fn finish(self) -> (Settings, Errors) {
        (self.settings, self.errors)
    }

    fn store(&mut self, name: &'static str, kind: Kind, value: &Value) -> Result<(), Error> {
        let invalid = || Error::InvalidSetting {
            name: name.to_string(),
            expected: kind.expected(),
        };

        match name {
            "log_level" => {
                let level = value.as_i64().ok_or_else(invalid)?;
                if !(0..=5).contains(&level) {
                    return Err(Error::InvalidSetting {
                        name: name.to_string(),
                        expected: "integer between 0 and 5",
                    });
                }
                self.settings.log_level = level;
            }
            "only_validate" => self.settings.only_validate = value.as_bool().ok_or_else(invalid)?,
            "run_once" => self.settings.run_once = value.as_bool().ok_or_else(invalid)?,
            "print_config" => self.settings.print_config = value.as_bool().ok_or_else(invalid)?,
            "print_traceback" => {
                self.settings.print_traceback = value.as_bool().ok_or_else(invalid)?
            }
            "disable_outputs" => {
                self.settings.disable_outputs = value.as_bool().ok_or_else(invalid)?
            }
            "disable_default" => {
                self.settings.disable_default = value.as_bool().ok_or_else(invalid)?
            }
            "execution_pool" => {
                let raw = value.as_str().ok_or_else(invalid)?;
                self.settings.execution_pool = raw.parse().map_err(|()| invalid())?;
            }
            "disable_readiness_probe" => {
                self.settings.disable_readiness_probe = value.as_bool().ok_or_else(invalid)?
            }
            "skip_disabled_validation" => {
                self.settings.skip_disabled_validation = value.as_bool().ok_or_else(invalid)?
            }
            "allow_none_metric" => {
                self.settings.allow_none_metric = value.as_bool().ok_or_else(invalid)?
            }
            "nested_attr_seperator" => {
                let raw = value.as_str().ok_or_else(invalid)?;
                if raw.is_empty() {
                    return Err(invalid());
                }
                self.settings.nested_attr_seperator = raw.to_string();
            }
            "timezone" => {
                let raw = value.as_str().ok_or_else(invalid)?;
                self.settings.timezone =
                    raw.parse().map_err(|_| Error::InvalidTimezone {
                        name: raw.to_string(),
                    })?;
            }
            _ => unreachable!("every KNOWN name is stored"),
        }
        Ok(())
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment values arrive as text; booleans and integers parse leniently
/// so that `STREAMLET_RUN_ONCE=1` behaves as expected.
fn parse_env(raw: &str) -> Value {
    match raw.trim() {
        "true" | "True" | "1" | "yes" => Value::Bool(true),
        "false" | "False" | "0" | "no" => Value::Bool(false),
        trimmed => match trimmed.parse::<i64>() {
            Ok(i) => Value::from(i),
            Err(_) => Value::from(trimmed),
        },
    }
}

fn closest(name: &str) -> Option<&'static str> {
    KNOWN
        .iter()
        .filter_map(|(known, _)| {
            let dist = strsim::osa_distance(name, known);
            (dist <= SUGGEST_DISTANCE).then_some((dist, *known))
        })
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, known)| known)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layer_precedence() {
        let mut builder = SettingsBuilder::new();
        builder.apply("log_level", &json!(4), SettingsLayer::CommandLine);
        builder.apply("log_level", &json!(1), SettingsLayer::Environment);
        builder.apply("run_once", &json!(true), SettingsLayer::Environment);
        builder.apply_config(&BTreeMap::from([
            ("log_level".to_string(), json!(0)),
            ("run_once".to_string(), json!(false)),
            ("timezone".to_string(), json!("Europe/Vienna")),
        ]));

        let (settings, errors) = builder.finish();
        assert!(errors.is_empty(), "{errors}");

        // Command line beats environment beats configuration.
        assert_eq!(settings.log_level, 4);
        assert!(settings.run_once);
        assert_eq!(settings.timezone, chrono_tz::Europe::Vienna);
    }

    #[test]
    fn test_unknown_setting_suggestion() {
        let mut builder = SettingsBuilder::new();
        builder.apply_config(&BTreeMap::from([("run_one".to_string(), json!(true))]));

        let (_, errors) = builder.finish();
        let scoped = errors.first().unwrap();
        assert_eq!(scoped.path, "[flow][settings][run_one]");
        assert_eq!(
            scoped.error,
            Error::UnknownSettingSuggest {
                name: "run_one".to_string(),
                suggest: "run_once".to_string(),
            }
        );
    }

    #[test]
    fn test_ill_typed_values() {
        let mut builder = SettingsBuilder::new();
        builder.apply_config(&BTreeMap::from([
            ("log_level".to_string(), json!("chatty")),
            ("execution_pool".to_string(), json!("sequential")),
            ("timezone".to_string(), json!("Mars/Olympus")),
        ]));

        let (_, errors) = builder.finish();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_env_value_parsing() {
        assert_eq!(parse_env("true"), json!(true));
        assert_eq!(parse_env("0"), json!(false));
        assert_eq!(parse_env("42"), json!(42));
        assert_eq!(parse_env("serial"), json!("serial"));
    }
}
