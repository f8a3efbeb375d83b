use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// This module contains newtypes naming other entities of the flow.
// They use the newtype pattern for strong type safety.

lazy_static! {
    // NAME_RE is quite permissive, prohibiting only whitespace: names are
    // referenced from routing filters and repeat_for templates, where
    // whitespace would be ambiguous.
    static ref NAME_RE: Regex = Regex::new(r"\S+").unwrap();
}

/// A name which failed validation, with the portion that did not match.
#[derive(thiserror::Error, Debug)]
#[error("{name:?} cannot be used as a {entity} name ({unmatched:?} is invalid)")]
pub struct InvalidName {
    pub entity: &'static str,
    pub name: String,
    pub unmatched: String,
}

macro_rules! string_name_types {
    (
        $(#[$outer:meta])*
        $vis:vis struct $Wrapper:ident($Entity:literal);

        $($rest:tt)*
    ) => {

        $(#[$outer])*
        #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $Wrapper(String);

        impl $Wrapper {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn validate(&self) -> Result<(), InvalidName> {
                let s = self.0.as_str();

                let unmatched = match NAME_RE.find(s) {
                    Some(m) if m.start() == 0 && m.end() == s.len() => None, // Full match.
                    Some(m) => Some([&s[..m.start()], &s[m.end()..]].concat()), // Partial match.
                    None => Some(s.to_string()), // No match.
                };

                match unmatched {
                    Some(unmatched) => Err(InvalidName {
                        entity: $Entity,
                        name: s.to_string(),
                        unmatched,
                    }),
                    None => Ok(()),
                }
            }
        }

        impl std::ops::Deref for $Wrapper {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $Wrapper {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<$Wrapper> for String {
            fn from(w: $Wrapper) -> String {
                w.0
            }
        }

        impl fmt::Display for $Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        string_name_types! {
            $($rest)*
        }
    };

    () => {};
}

string_name_types! {
    /// TaskName names a scheduled task. Task names are globally unique
    /// across every input of the flow.
    pub struct TaskName("task");

    /// ModuleName names a configured module instance. Module names are
    /// unique within their variant.
    pub struct ModuleName("module");

    /// ModuleType identifies a registered module implementation.
    pub struct ModuleType("module type");
}

#[cfg(test)]
mod test {
    use super::TaskName;

    #[test]
    fn test_name_re() {
        for (case, expect) in [
            ("valid", true),
            ("valid.with-punct_0", true),
            ("pg/main", true),
            ("t_$i", true),
            ("no spaces", false),
            ("trailing ", false),
            ("", false),
        ] {
            let out = TaskName::new(case).validate();
            if expect {
                out.unwrap();
            } else {
                out.unwrap_err();
            }
        }
    }
}
