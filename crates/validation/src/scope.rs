use std::fmt;

/// Scope is a stack-based mechanism for tracking the fine-grained location
/// within the configuration document currently being validated. Scopes are
/// cheap to copy and live on the call stack of the walking validator.
#[derive(Copy, Clone)]
pub struct Scope<'a> {
    /// Parent of this Scope, or None if this is the document root.
    parent: Option<&'a Scope<'a>>,
    location: Location<'a>,
}

#[derive(Copy, Clone)]
enum Location<'a> {
    Root,
    Property(&'a str),
    Index(usize),
}

impl<'a> Scope<'a> {
    /// Create a new scope rooted at the document.
    pub fn root() -> Scope<'static> {
        Scope {
            parent: None,
            location: Location::Root,
        }
    }

    /// Push a property onto the current Scope, returning a new Scope.
    pub fn push_prop(&'a self, name: &'a str) -> Scope<'a> {
        Scope {
            parent: Some(self),
            location: Location::Property(name),
        }
    }

    /// Push an item index onto the current Scope, returning a new Scope.
    pub fn push_item(&'a self, index: usize) -> Scope<'a> {
        Scope {
            parent: Some(self),
            location: Location::Index(index),
        }
    }

    /// Flatten the scope into its bracketed document path,
    /// such as `[inputs][2][tasks][1][cron]`.
    pub fn flatten(&self) -> String {
        let mut rendered = self.parent.map(Scope::flatten).unwrap_or_default();

        match self.location {
            Location::Root => (),
            Location::Property(name) => {
                rendered.push('[');
                rendered.push_str(name);
                rendered.push(']');
            }
            Location::Index(index) => {
                rendered.push('[');
                rendered.push_str(&index.to_string());
                rendered.push(']');
            }
        }
        rendered
    }
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rendered = self.flatten();
        if rendered.is_empty() {
            f.write_str("<root>")
        } else {
            f.write_str(&rendered)
        }
    }
}
