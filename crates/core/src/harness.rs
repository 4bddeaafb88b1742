//! Stage-and-run, serialised per sandbox.

use std::fmt;
use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

use crate::component::Component;
use crate::runner::{RunOutcome, RunnerError, TestRunner};
use crate::sandbox::{Sandbox, SandboxError};

/// Staging or running a test failed.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The sandbox could not be prepared.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    /// The runner could not produce a verdict.
    #[error(transparent)]
    Runner(#[from] RunnerError),
}

/// A sandbox and a runner, used by one stage-and-run at a time.
///
/// Clones share the lock, so sessions holding clones of the same harness
/// never interleave their clear-write-run steps.
#[derive(Clone)]
pub struct Harness {
    sandbox: Sandbox,
    runner: Arc<dyn TestRunner>,
    lock: Arc<Mutex<()>>,
}

impl Harness {
    /// Creates a harness.
    #[inline]
    pub fn new<R: TestRunner + 'static>(sandbox: Sandbox, runner: R) -> Self {
        Self::with_shared_runner(sandbox, Arc::new(runner))
    }

    /// Creates a harness around an already shared runner.
    #[inline]
    pub fn with_shared_runner(
        sandbox: Sandbox,
        runner: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            sandbox,
            runner,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the sandbox.
    #[inline]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Stages `component` with `test_source` and runs the test.
    pub async fn run(
        &self,
        component: &Component,
        test_source: &str,
    ) -> Result<RunOutcome, HarnessError> {
        let _guard = self.lock.lock().await;

        let sandbox = self.sandbox.clone();
        let component = component.clone();
        let test_source = test_source.to_owned();
        let staged =
            spawn_blocking(move || sandbox.stage(&component, &test_source))
                .await
                .map_err(|err| SandboxError::Io {
                    action: "stage",
                    path: self.sandbox.component_dir().to_owned(),
                    source: io::Error::other(err.to_string()),
                })??;

        Ok(self.runner.run(&staged.test_path).await?)
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}
