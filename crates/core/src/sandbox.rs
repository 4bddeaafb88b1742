//! The isolated directory pair generated tests are staged and run in.

use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::component::{Component, ComponentName, InvalidNameError};

/// Directory (under the sandbox root) holding the staged component.
pub const COMPONENT_DIR: &str = "component";
/// Directory (under the sandbox root) holding the staged test.
pub const TEST_DIR: &str = "test";
/// How a staged test file reaches the staged component.
pub const IMPORT_PREFIX: &str = "../component";

/// Staging failed. A sandbox write failure aborts the run and is never
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// A component or test file name is not a plain file name.
    #[error(transparent)]
    InvalidName(#[from] InvalidNameError),
    /// A file system operation failed.
    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        /// What was being done, e.g. `"write"`.
        action: &'static str,
        /// The path that was operated on.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
}

impl SandboxError {
    fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_owned();
        move |source| SandboxError::Io {
            action,
            path,
            source,
        }
    }
}

/// Paths of the files written by [`Sandbox::prepare`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedFiles {
    /// Where the component was written.
    pub component_path: PathBuf,
    /// Where the test was written.
    pub test_path: PathBuf,
}

/// A pair of directories, one holding exactly the staged component and one
/// holding exactly the staged test.
///
/// Both directories are emptied before every write, so nothing from a
/// previous run can leak into the current one. The sandbox does no locking:
/// callers that share one sandbox between concurrent sessions must serialise
/// stage-and-run themselves (see [`crate::Harness`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sandbox {
    component_dir: PathBuf,
    test_dir: PathBuf,
}

impl Sandbox {
    /// Creates a sandbox rooted at `root`, using the `component` and `test`
    /// sub-directories. Nothing is touched on disk until the first
    /// [`Sandbox::prepare`].
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            component_dir: root.join(COMPONENT_DIR),
            test_dir: root.join(TEST_DIR),
        }
    }

    /// Returns the directory holding the staged component.
    #[inline]
    pub fn component_dir(&self) -> &Path {
        &self.component_dir
    }

    /// Returns the directory holding the staged test.
    #[inline]
    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// Clears both directories and writes the component and the test file.
    pub fn prepare(
        &self,
        component_name: &str,
        component_source: &str,
        test_file_name: &str,
        test_source: &str,
    ) -> Result<StagedFiles, SandboxError> {
        // Both names end up as file names, validate them the same way.
        let component_name = ComponentName::new(component_name)?;
        let test_file_name = ComponentName::new(test_file_name)?;

        clear_dir(&self.component_dir)?;
        clear_dir(&self.test_dir)?;

        let component_path = write_atomic(
            &self.component_dir,
            component_name.as_str(),
            component_source,
        )?;
        let test_path =
            write_atomic(&self.test_dir, test_file_name.as_str(), test_source)?;
        debug!(
            "staged {} and {}",
            component_path.display(),
            test_path.display()
        );
        Ok(StagedFiles {
            component_path,
            test_path,
        })
    }

    /// Stages `component` with a test whose file name follows the naming
    /// convention of [`ComponentName::test_file_name`].
    #[inline]
    pub fn stage(
        &self,
        component: &Component,
        test_source: &str,
    ) -> Result<StagedFiles, SandboxError> {
        self.prepare(
            component.name().as_str(),
            component.source(),
            &component.name().test_file_name(),
            test_source,
        )
    }
}

/// Makes sure `dir` exists and is empty.
fn clear_dir(dir: &Path) -> Result<(), SandboxError> {
    trace!("clearing {}", dir.display());
    fs::create_dir_all(dir).map_err(SandboxError::io("create", dir))?;
    let entries = fs::read_dir(dir).map_err(SandboxError::io("list", dir))?;
    for entry in entries {
        let entry = entry.map_err(SandboxError::io("list", dir))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(SandboxError::io("inspect", &path))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path)
                .map_err(SandboxError::io("remove", &path))?;
        } else {
            fs::remove_file(&path).map_err(SandboxError::io("remove", &path))?;
        }
    }
    Ok(())
}

/// Writes `content` to `dir/file_name` through a temporary file in the same
/// directory, so the destination is either absent or complete.
fn write_atomic(
    dir: &Path,
    file_name: &str,
    content: &str,
) -> Result<PathBuf, SandboxError> {
    let path = dir.join(file_name);
    let mut file =
        NamedTempFile::new_in(dir).map_err(SandboxError::io("create", dir))?;
    file.write_all(content.as_bytes())
        .and_then(|_| file.flush())
        .map_err(SandboxError::io("write", &path))?;
    file.persist(&path)
        .map_err(|err| SandboxError::io("persist", &path)(err.error))?;
    Ok(path)
}
