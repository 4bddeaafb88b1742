//! Testing types and the iteration budget.

use std::fmt::{self, Display};
use std::num::NonZeroU32;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::prompt;

/// Selects the prompt template, the best-practice corpus and the iteration
/// policy of a session.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TestingType {
    /// Vue single-file components tested with jest and vue-test-utils.
    /// Failures are fed back to the model until the budget runs out.
    #[default]
    VueJest,
    /// Plain JavaScript modules tested with mocha and chai. One attempt,
    /// no feedback.
    JsMocha,
}

impl TestingType {
    /// All testing types.
    pub const ALL: [TestingType; 2] =
        [TestingType::VueJest, TestingType::JsMocha];

    /// The identifier used in configuration and on the command line.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            TestingType::VueJest => "vue_jest",
            TestingType::JsMocha => "js_mocha",
        }
    }

    /// Whether failures are fed back for another attempt.
    #[inline]
    pub fn iterates(self) -> bool {
        matches!(self, TestingType::VueJest)
    }

    /// The best-practice corpus consulted for the initial prompt.
    #[inline]
    pub fn corpus(self) -> &'static str {
        match self {
            TestingType::VueJest => "testing",
            TestingType::JsMocha => "mochatesting",
        }
    }

    /// The system message opening every conversation of this type.
    #[inline]
    pub fn system_message(self) -> &'static str {
        prompt::system_message(self)
    }

    /// The number of test executions a session of this type may make.
    #[inline]
    pub fn max_attempts(self, budget: IterationBudget) -> u32 {
        if self.iterates() { budget.get() } else { 1 }
    }
}

impl Display for TestingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unknown testing type name.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported testing type {0:?} (expected vue_jest or js_mocha)")]
pub struct UnknownTestingType(String);

impl FromStr for TestingType {
    type Err = UnknownTestingType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TestingType::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTestingType(s.to_owned()))
    }
}

/// The maximum number of generate-run-diagnose cycles of an iterating
/// session. Never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IterationBudget(NonZeroU32);

impl IterationBudget {
    /// The budget used when none is configured.
    pub const DEFAULT: IterationBudget =
        IterationBudget(NonZeroU32::MIN.saturating_add(2));

    /// Returns `None` for zero.
    #[inline]
    pub fn new(max: u32) -> Option<Self> {
        NonZeroU32::new(max).map(Self)
    }

    /// Returns the budget as a number.
    #[inline]
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for IterationBudget {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for IterationBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
