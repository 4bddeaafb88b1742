//! Runs generated tests through the test framework.

mod coverage;
mod report;

use std::ffi::OsString;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

pub use coverage::{CoverageHook, CoverageReport, NoCoverage, UncoveredLines};
pub use report::{
    AssertionResult, JestReport, NEWLINE_SENTINEL, TestFileResult,
    clean_message,
};

/// How long a test run may take by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// The normalized result of one test run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// The runner's own success flag.
    pub passed: bool,
    /// Cleaned failure messages, empty when nothing failed.
    pub diagnostics: String,
    /// Titles of the failed tests.
    pub failed_assertions: Vec<String>,
    /// Coverage data, if the configured hook collected any.
    pub coverage: Option<CoverageReport>,
}

impl RunOutcome {
    /// Normalizes a parsed report.
    pub fn from_report(report: &JestReport, hook: &dyn CoverageHook) -> Self {
        Self {
            passed: report.success,
            diagnostics: report.diagnostics(),
            failed_assertions: report.failed_assertions(),
            coverage: hook.collect(report),
        }
    }
}

/// The kind of runner failure. None of them means the tests failed: they
/// mean the harness is broken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunnerErrorKind {
    /// The process could not be started or waited for.
    Spawn,
    /// The process wrote to stderr.
    Stderr,
    /// Stdout is not a JSON report.
    Unparseable,
    /// The process did not finish in time and was killed.
    Timeout,
}

impl Display for RunnerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerErrorKind::Spawn => write!(f, "Failed to run the test runner"),
            RunnerErrorKind::Stderr => write!(f, "Test runner reported an error"),
            RunnerErrorKind::Unparseable => {
                write!(f, "Test runner output unparseable")
            }
            RunnerErrorKind::Timeout => write!(f, "Test runner timed out"),
        }
    }
}

/// Describes a runner failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {reason}")]
pub struct RunnerError {
    kind: RunnerErrorKind,
    reason: String,
    output: Option<String>,
}

impl RunnerError {
    /// Creates a new error with the `Spawn` kind.
    #[inline]
    pub fn spawn<S: Into<String>>(reason: S) -> Self {
        Self {
            kind: RunnerErrorKind::Spawn,
            reason: reason.into(),
            output: None,
        }
    }

    /// Creates a new error with the `Stderr` kind, carrying the stderr text.
    #[inline]
    pub fn stderr<S: Into<String>>(stderr: S) -> Self {
        let stderr = stderr.into();
        Self {
            kind: RunnerErrorKind::Stderr,
            reason: stderr.trim().to_owned(),
            output: Some(stderr),
        }
    }

    /// Creates a new error with the `Unparseable` kind, carrying the raw
    /// stdout.
    #[inline]
    pub fn unparseable<S: Into<String>>(reason: S, stdout: String) -> Self {
        Self {
            kind: RunnerErrorKind::Unparseable,
            reason: reason.into(),
            output: Some(stdout),
        }
    }

    /// Creates a new error with the `Timeout` kind.
    #[inline]
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: RunnerErrorKind::Timeout,
            reason: format!("killed after {after:?}"),
            output: None,
        }
    }

    /// Returns the kind of the error.
    #[inline]
    pub fn kind(&self) -> RunnerErrorKind {
        self.kind
    }

    /// Returns the reason for the error.
    #[inline]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the captured stderr or stdout, for diagnosis.
    #[inline]
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

/// Executes one test file.
#[async_trait]
pub trait TestRunner: Send + Sync {
    /// Runs the test file at `test_path`.
    ///
    /// A failing test is an `Ok` outcome; `Err` is reserved for a broken
    /// harness.
    async fn run(&self, test_path: &Path) -> Result<RunOutcome, RunnerError>;
}

/// How [`JestRunner`] invokes the test framework.
///
/// The command line is `<program> <args...> <test path> <flags...>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    program: OsString,
    args: Vec<OsString>,
    flags: Vec<OsString>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: "node".into(),
            args: vec!["node_modules/.bin/jest".into()],
            flags: ["--json", "--silent", "--noStackTrace"]
                .into_iter()
                .map(OsString::from)
                .collect(),
            working_dir: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RunnerConfig {
    /// Sets the program to spawn.
    #[inline]
    pub fn with_program<S: Into<OsString>>(mut self, program: S) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the arguments placed before the test path.
    #[inline]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the flags placed after the test path.
    #[inline]
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the directory the runner is started in, usually the project
    /// holding `node_modules`.
    #[inline]
    pub fn with_working_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets how long a run may take before it is killed.
    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the run timeout.
    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Runs tests with jest's JSON reporter in a child process.
#[derive(Clone)]
pub struct JestRunner {
    config: RunnerConfig,
    coverage: Arc<dyn CoverageHook>,
}

impl JestRunner {
    /// Creates a runner that collects no coverage.
    #[inline]
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            coverage: Arc::new(NoCoverage),
        }
    }

    /// Replaces the coverage hook.
    #[inline]
    pub fn with_coverage_hook<H: CoverageHook + 'static>(
        mut self,
        hook: H,
    ) -> Self {
        self.coverage = Arc::new(hook);
        self
    }

    fn command(&self, test_path: &Path) -> Command {
        let config = &self.config;
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .arg(test_path)
            .args(&config.flags)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.coverage.wants_coverage() {
            command.arg("--coverage");
        }
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Debug for JestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JestRunner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TestRunner for JestRunner {
    async fn run(&self, test_path: &Path) -> Result<RunOutcome, RunnerError> {
        debug!("running {}", test_path.display());
        let child = self.command(test_path).spawn().map_err(|err| {
            error!("failed to spawn {:?}: {err}", self.config.program);
            RunnerError::spawn(format!(
                "{}: {err}",
                self.config.program.to_string_lossy()
            ))
        })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(
            self.config.timeout,
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                error!("failed to wait for the test runner: {err}");
                return Err(RunnerError::spawn(err.to_string()));
            }
            Err(_) => {
                error!("test runner timed out after {:?}", self.config.timeout);
                return Err(RunnerError::timeout(self.config.timeout));
            }
        };
        trace!("test runner exited with {}", output.status);

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            error!("test runner wrote to stderr: {stderr}");
            return Err(RunnerError::stderr(stderr));
        }

        let report: JestReport = match serde_json::from_slice(&output.stdout) {
            Ok(report) => report,
            Err(err) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                error!("failed to parse the test runner output: {err}\n{stdout}");
                return Err(RunnerError::unparseable(err.to_string(), stdout));
            }
        };
        let outcome = RunOutcome::from_report(&report, self.coverage.as_ref());
        debug!(
            "{} of {} tests failed",
            report.num_failed_tests, report.num_total_tests
        );
        if !outcome.failed_assertions.is_empty() {
            debug!("failed tests: {:?}", outcome.failed_assertions);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn script_runner(script: &str) -> JestRunner {
        let config = RunnerConfig::default()
            .with_program("/bin/sh")
            .with_args(["-c", script, "jest"])
            .with_flags(Vec::<OsString>::new());
        JestRunner::new(config)
    }

    #[tokio::test]
    async fn test_passing_run() {
        let runner = script_runner(
            r#"printf '{"success":true,"numTotalTests":1,"testResults":[]}'"#,
        );
        let outcome = runner.run(Path::new("Foo.spec.js")).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome {
                passed: true,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_failing_run() {
        let runner = script_runner(
            r#"printf '{"success":false,"testResults":[{"name":"%s","message":"Expected 1\\n    at Object.<anonymous> (/x/y:1:1)\\nReceived 2","assertionResults":[{"title":"adds","status":"failed"}]}]}' "$1""#,
        );
        let outcome = runner.run(Path::new("/tmp/bar.test.js")).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.diagnostics, "Expected 1 <<newline>> Received 2");
        assert_eq!(outcome.failed_assertions, vec!["adds".to_owned()]);
        assert_eq!(outcome.coverage, None);
    }

    #[tokio::test]
    async fn test_flags_follow_test_path() {
        let config = RunnerConfig::default()
            .with_program("/bin/sh")
            .with_args([
                "-c",
                r#"[ "$1" = "a.test.js" ] && [ "$2" = "--json" ] && printf '{"success":true}'"#,
                "jest",
            ])
            .with_flags(["--json"]);
        let outcome = JestRunner::new(config)
            .run(Path::new("a.test.js"))
            .await
            .unwrap();
        assert!(outcome.passed);
    }

    #[tokio::test]
    async fn test_stderr_is_infrastructure_failure() {
        let runner = script_runner(
            r#"echo 'Cannot find module' >&2; printf '{"success":true}'"#,
        );
        let err = runner.run(Path::new("x.test.js")).await.unwrap_err();
        assert_eq!(err.kind(), RunnerErrorKind::Stderr);
        assert_eq!(err.reason(), "Cannot find module");
        assert_eq!(err.output(), Some("Cannot find module\n"));
    }

    #[tokio::test]
    async fn test_unparseable_output() {
        let runner = script_runner("echo 'not json'");
        let err = runner.run(Path::new("x.test.js")).await.unwrap_err();
        assert_eq!(err.kind(), RunnerErrorKind::Unparseable);
        assert_eq!(err.output(), Some("not json\n"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let runner = JestRunner::new(
            RunnerConfig::default().with_program("/nonexistent/testsmith-node"),
        );
        let err = runner.run(Path::new("x.test.js")).await.unwrap_err();
        assert_eq!(err.kind(), RunnerErrorKind::Spawn);
    }

    #[tokio::test]
    async fn test_timeout() {
        let config = RunnerConfig::default()
            .with_program("/bin/sh")
            .with_args(["-c", "sleep 5", "jest"])
            .with_flags(Vec::<OsString>::new())
            .with_timeout(Duration::from_millis(100));
        let err = JestRunner::new(config)
            .run(Path::new("x.test.js"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RunnerErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_coverage_hook_requests_coverage() {
        let runner = script_runner(
            r#"for arg; do [ "$arg" = "--coverage" ] && printf '{"success":true,"coverageMap":{}}' && exit 0; done; echo missing"#,
        )
        .with_coverage_hook(UncoveredLines);
        let outcome = runner.run(Path::new("x.test.js")).await.unwrap();
        assert_eq!(outcome.coverage, Some(CoverageReport::default()));
    }
}
