//! The component under test.

use std::fmt::{self, Display};

/// A component name was rejected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid component name {name:?}: {reason}")]
pub struct InvalidNameError {
    name: String,
    reason: &'static str,
}

/// The file name of a component, such as `Foo.vue` or `bar.js`.
///
/// The name is a single path component: it is used verbatim as a file
/// name inside the sandbox, and to derive the generated test's file name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentName(String);

impl ComponentName {
    /// Validates `name`.
    pub fn new<S: Into<String>>(name: S) -> Result<Self, InvalidNameError> {
        let name = name.into();
        let reject = |reason| InvalidNameError {
            name: name.clone(),
            reason,
        };
        if name.trim().is_empty() {
            return Err(reject("the name is empty"));
        }
        if name != name.trim() {
            return Err(reject("the name has surrounding whitespace"));
        }
        if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
            return Err(reject("the name must be a plain file name"));
        }
        if name.starts_with('.') {
            return Err(reject("the name has no stem"));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a Vue single-file component.
    #[inline]
    pub fn is_vue(&self) -> bool {
        self.extension() == ".vue"
    }

    /// The name without its extension.
    #[inline]
    pub fn stem(&self) -> &str {
        match self.0.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => &self.0,
        }
    }

    /// The extension including the leading dot, or an empty string.
    #[inline]
    pub fn extension(&self) -> &str {
        match self.0.rfind('.') {
            Some(idx) => &self.0[idx..],
            None => "",
        }
    }

    /// The file name of the generated test: `Foo.vue` maps to
    /// `Foo.spec.js`, `bar.js` to `bar.test.js`, and `baz` to
    /// `baz.test.js`.
    pub fn test_file_name(&self) -> String {
        if self.is_vue() {
            format!("{}.spec.js", self.stem())
        } else {
            format!("{}.test.js", self.stem())
        }
    }
}

impl Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A component and its full source text. Immutable once a session starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Component {
    name: ComponentName,
    source: String,
}

impl Component {
    /// Creates a component from its name and source text.
    #[inline]
    pub fn new(name: ComponentName, source: impl Into<String>) -> Self {
        Self {
            name,
            source: source.into(),
        }
    }

    /// Returns the component's file name.
    #[inline]
    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Returns the component's source text.
    #[inline]
    pub fn source(&self) -> &str {
        &self.source
    }
}
