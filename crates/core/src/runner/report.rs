//! The JSON report printed by `jest --json`.

use serde::Deserialize;
use serde_json::Value;

/// Joins the surviving lines of one failure message.
pub const NEWLINE_SENTINEL: &str = " <<newline>> ";

/// Top-level report. Unknown fields are ignored.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JestReport {
    /// Whether every test passed.
    pub success: bool,
    /// Number of tests that ran.
    #[serde(default)]
    pub num_total_tests: u32,
    /// Number of failed tests.
    #[serde(default)]
    pub num_failed_tests: u32,
    /// One entry per test file.
    #[serde(default)]
    pub test_results: Vec<TestFileResult>,
    /// Istanbul coverage data, present when coverage was requested.
    #[serde(default)]
    pub coverage_map: Option<Value>,
}

/// The result of one test file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestFileResult {
    /// Path of the test file.
    #[serde(default)]
    pub name: String,
    /// `passed` or `failed`.
    #[serde(default)]
    pub status: String,
    /// The failure narrative of the whole file, stack frames included.
    #[serde(default)]
    pub message: Option<String>,
    /// Per-test results.
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
}

/// The result of one `it`/`test` block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    /// The test title.
    #[serde(default)]
    pub title: String,
    /// `passed`, `failed`, `pending`, ...
    #[serde(default)]
    pub status: String,
    /// Failure messages, empty for passing tests.
    #[serde(default)]
    pub failure_messages: Vec<String>,
}

impl JestReport {
    /// Cleans every file's message and joins them with a blank line.
    /// Files without a message contribute nothing.
    pub fn diagnostics(&self) -> String {
        self.test_results
            .iter()
            .filter_map(|result| result.message.as_deref())
            .map(clean_message)
            .filter(|message| !message.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Titles of the tests that failed.
    pub fn failed_assertions(&self) -> Vec<String> {
        self.test_results
            .iter()
            .flat_map(|result| &result.assertion_results)
            .filter(|assertion| assertion.status == "failed")
            .map(|assertion| assertion.title.clone())
            .collect()
    }
}

/// Drops the stack frame lines of `message` and joins the rest with
/// [`NEWLINE_SENTINEL`].
pub fn clean_message(message: &str) -> String {
    if message.is_empty() {
        return String::new();
    }
    message
        .split('\n')
        .filter(|line| !is_stack_frame(line))
        .collect::<Vec<_>>()
        .join(NEWLINE_SENTINEL)
}

/// An indented line starting with `at `.
#[inline]
fn is_stack_frame(line: &str) -> bool {
    let rest = line.trim_start();
    rest.len() < line.len() && rest.starts_with("at ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_clean_message() {
        let message = "● Foo › renders\n\n    expect(received).toBe(expected)\n    at Object.<anonymous> (/x/y:1:1)\n\tat process (node:internal)\nReceived: 2";
        assert_eq!(
            clean_message(message),
            "● Foo › renders <<newline>>  <<newline>>     expect(received).toBe(expected) <<newline>> Received: 2"
        );
        // Not indented, so not a frame.
        assert_eq!(clean_message("at least one"), "at least one");
        assert_eq!(clean_message(""), "");
    }

    #[test]
    fn test_parse_report() {
        let report: JestReport = serde_json::from_str(
            r#"{
                "success": false,
                "numTotalTests": 2,
                "numFailedTests": 1,
                "startTime": 0,
                "testResults": [
                    {
                        "name": "/tmp/test/Foo.spec.js",
                        "status": "failed",
                        "message": "boom\n    at x (y:1:1)",
                        "assertionResults": [
                            { "title": "renders", "status": "passed", "failureMessages": [] },
                            { "title": "clicks", "status": "failed", "failureMessages": ["boom"] }
                        ]
                    },
                    { "name": "/tmp/test/Other.spec.js", "status": "passed", "message": "" },
                    { "name": "/tmp/test/Third.spec.js" }
                ]
            }"#,
        )
        .unwrap();

        assert!(!report.success);
        assert_eq!(report.num_total_tests, 2);
        assert_eq!(report.num_failed_tests, 1);
        assert_eq!(report.coverage_map, None);
        assert_eq!(report.diagnostics(), "boom");
        assert_eq!(report.failed_assertions(), vec!["clicks".to_owned()]);
    }

    #[test]
    fn test_diagnostics_join_files() {
        let report = JestReport {
            success: false,
            test_results: vec![
                TestFileResult {
                    message: Some("first\n    at a".to_owned()),
                    ..Default::default()
                },
                TestFileResult {
                    message: Some("second\nline".to_owned()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(report.diagnostics(), "first\n\nsecond <<newline>> line");
    }

    #[test]
    fn test_success_is_required() {
        assert!(serde_json::from_str::<JestReport>(r#"{"testResults": []}"#).is_err());
    }
}
