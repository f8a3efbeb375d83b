use super::Scope;
use models::ModuleVariant;
use std::fmt;

/// Error is a configuration defect detected during loading, expansion, or
/// validation. Every error is recorded together with the document path that
/// produced it.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("missing required property {key:?}")]
    MissingProperty { key: String },
    #[error("unknown property {key:?}")]
    UnknownProperty { key: String },
    #[error("unknown property {key:?}; did you mean {suggest:?}? (for example: {suggest}: {example})")]
    UnknownPropertySuggest {
        key: String,
        suggest: String,
        example: String,
    },
    #[error("expected {expected}, found {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{value:?} is not a valid time period (use seconds, or an integer suffixed with s|m|h|d)")]
    InvalidDuration { value: String },
    #[error("{value:?} is not a valid signed time period (use seconds, or an integer suffixed with s|m|h|d, optionally negated)")]
    InvalidShift { value: String },
    #[error("time_modulus must be a positive period")]
    ZeroModulus,
    #[error("{value:?} is not a valid cron expression ({detail})")]
    InvalidCron { value: String, detail: String },
    #[error("no union branch matched: {}", .branches.join("; "))]
    UnionMismatch { branches: Vec<String> },

    #[error("{entity} {name:?} has a duplicated definition")]
    Duplicate { entity: &'static str, name: String },
    #[error("include_{kind} and exclude_{kind} cannot both be set")]
    FilterConflict { kind: &'static str },
    #[error("priority {value} is outside the permitted range [-256, 256]")]
    PriorityRange { value: i64 },
    #[error("repeat_for values of {variable:?} must all have the same length ({expect} != {actual})")]
    RepeatLength {
        variable: String,
        expect: usize,
        actual: usize,
    },
    #[error("task {task:?} selects no metrics, which requires the allow_none_metric setting")]
    NoneMetricNotAllowed { task: String },
    #[error("metric and attribute selectors of task {task:?} both select {key:?}")]
    SelectorOverlap { task: String, key: String },
    #[error("{pattern:?} is not a valid glob pattern ({detail})")]
    InvalidPattern { pattern: String, detail: String },
    #[error("{type_:?} is not a registered {variant} type")]
    NoSuchModuleType {
        type_: String,
        variant: ModuleVariant,
    },
    #[error("{type_:?} is not a registered {variant} type; did you mean {suggest:?}?")]
    NoSuchModuleTypeSuggest {
        type_: String,
        variant: ModuleVariant,
        suggest: String,
    },
    #[error("module type {type_:?} is an {actual}, not an {expect}")]
    WrongVariant {
        type_: String,
        expect: ModuleVariant,
        actual: ModuleVariant,
    },

    #[error("unknown setting {name:?}")]
    UnknownSetting { name: String },
    #[error("unknown setting {name:?}; did you mean {suggest:?}?")]
    UnknownSettingSuggest { name: String, suggest: String },
    #[error("setting {name:?} expects a {expected} value")]
    InvalidSetting {
        name: String,
        expected: &'static str,
    },
    #[error("{name:?} is not a known IANA timezone")]
    InvalidTimezone { name: String },

    #[error("the validated document failed to decode ({detail})")]
    Decode { detail: String },

    #[error("{name:?} cannot be used as a {entity} name ({unmatched:?} is invalid)")]
    InvalidName {
        entity: &'static str,
        name: String,
        unmatched: String,
    },
}

impl From<models::InvalidName> for Error {
    fn from(err: models::InvalidName) -> Self {
        Error::InvalidName {
            entity: err.entity,
            name: err.name,
            unmatched: err.unmatched,
        }
    }
}

/// ScopedError pairs an Error with the flattened document path at which it
/// was detected.
#[derive(Debug, PartialEq)]
pub struct ScopedError {
    pub path: String,
    pub error: Error,
}

impl fmt::Display for ScopedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "at <root>: {}", self.error)
        } else {
            write!(f, "at {}: {}", self.path, self.error)
        }
    }
}

/// Errors is the ordered accumulation of scoped validation errors.
#[derive(Debug, Default, PartialEq)]
pub struct Errors(Vec<ScopedError>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope<'_>, error: Error) {
        self.0.push(ScopedError {
            path: scope.flatten(),
            error,
        });
    }

    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScopedError> {
        self.0.iter()
    }

    /// The first recorded error, for terse summaries.
    pub fn first(&self) -> Option<&ScopedError> {
        self.0.first()
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for scoped in &self.0 {
            writeln!(f, "{scoped}")?;
        }
        Ok(())
    }
}

impl IntoIterator for Errors {
    type Item = ScopedError;
    type IntoIter = std::vec::IntoIter<ScopedError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
