//! Pulls test code out of model replies.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::component::ComponentName;
use crate::sandbox::IMPORT_PREFIX;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap_or_else(|err| {
        unreachable!("invalid fenced block pattern: {err}")
    })
});

static RELATIVE_DEFAULT_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"import\s+([A-Za-z_$][\w$]*)\s+from\s+['"](\.\.?/[^'"\n]*)['"]"#,
    )
    .unwrap_or_else(|err| unreachable!("invalid import pattern: {err}"))
});

/// The result of [`Extractor::extract`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    /// The content of the first fenced block, imports rewritten.
    Code(String),
    /// The reply has no fenced block.
    NoCode,
}

impl Extraction {
    /// Returns the code, if any.
    #[inline]
    pub fn into_code(self) -> Option<String> {
        match self {
            Extraction::Code(code) => Some(code),
            Extraction::NoCode => None,
        }
    }
}

/// Import rewriting would produce an invalid string literal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("cannot rewrite imports to {target:?}: not a valid module path")]
pub struct RewriteError {
    target: String,
}

/// Extracts fenced code blocks and points their relative imports at the
/// staged component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extractor {
    prefix: String,
    file_name: String,
}

impl Extractor {
    /// Creates an extractor that rewrites every relative default import to
    /// `<prefix>/<file_name>`, whatever the imported binding is called.
    pub fn new(prefix: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            file_name: file_name.into(),
        }
    }

    /// Creates an extractor targeting the sandboxed copy of the component
    /// named `name`.
    #[inline]
    pub fn for_component(name: &ComponentName) -> Self {
        Self::new(IMPORT_PREFIX, name.as_str())
    }

    /// Returns the first fenced code block of `response`, trimmed and with
    /// its imports rewritten.
    ///
    /// If rewriting fails, the block is returned as is.
    pub fn extract(&self, response: &str) -> Extraction {
        let Some(code) = first_fenced_block(response) else {
            debug!("no code block in the reply");
            return Extraction::NoCode;
        };
        match self.rewrite_imports(code) {
            Ok(rewritten) => Extraction::Code(rewritten),
            Err(err) => {
                warn!("keeping the original imports: {err}");
                Extraction::Code(code.to_owned())
            }
        }
    }

    /// Rewrites every default import from a relative path
    /// (`import Button from './Foo.vue'`) to the staged component
    /// (`import Button from '../component/Foo.vue'`). The binding is kept.
    /// Package imports are left alone. Applying this twice is the same as
    /// applying it once.
    pub fn rewrite_imports(&self, code: &str) -> Result<String, RewriteError> {
        let target = format!("{}/{}", self.prefix, self.file_name);
        if target.contains(['\'', '"', '\\', '\n', '\r']) {
            return Err(RewriteError { target });
        }
        let rewritten =
            RELATIVE_DEFAULT_IMPORT.replace_all(code, |caps: &Captures<'_>| {
                let ident = &caps[1];
                trace!("rewriting the import of {ident} from {}", &caps[2]);
                format!("import {ident} from '{target}'")
            });
        Ok(rewritten.into_owned())
    }
}

/// Returns the trimmed content of the first fenced block in `text`.
pub fn first_fenced_block(text: &str) -> Option<&str> {
    if text.trim().is_empty() {
        return None;
    }
    FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}
