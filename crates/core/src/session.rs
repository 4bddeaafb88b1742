mod builder;
mod error;
mod state;

use std::sync::Arc;

use tracing::Instrument;

use crate::component::Component;
use crate::conversation::Conversation;
use crate::extract::{Extraction, Extractor};
use crate::harness::Harness;
use crate::model_client::ModelClient;
use crate::prompt;
use crate::retrieval::BestPracticeSource;
use crate::testing_type::{IterationBudget, TestingType};
pub use builder::SessionBuilder;
pub use error::{Error as SessionError, ErrorKind as SessionErrorKind};
use state::Stage;
pub use state::{CancellationToken, SessionEvent, SessionOutcome, Stopped};

/// Sent back to the model when a failing run produced no message.
const NO_DIAGNOSTICS: &str =
    "The tests failed without an error message. Fix the tests.";

type EventCallback = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Drives generate, run, diagnose and regenerate for one component at a
/// time.
///
/// Every call to [`Session::run`] starts a fresh conversation, which is
/// returned with the outcome. Stage-and-run goes through the shared
/// [`Harness`], so sessions built with clones of one harness can run
/// concurrently.
pub struct Session {
    model_client: ModelClient,
    harness: Harness,
    best_practices: Arc<dyn BestPracticeSource>,
    testing_type: TestingType,
    budget: IterationBudget,
    cancellation: CancellationToken,
    on_event: Option<EventCallback>,
}

impl Session {
    /// Returns the testing type.
    #[inline]
    pub fn testing_type(&self) -> TestingType {
        self.testing_type
    }

    /// Returns the number of test executions a run may make.
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.testing_type.max_attempts(self.budget)
    }

    /// Generates tests for `component` until they pass or the attempts run
    /// out.
    pub async fn run(
        &self,
        component: &Component,
    ) -> Result<SessionOutcome, SessionError> {
        let span = info_span!("session", component = %component.name());
        self.run_stages(component)
            .instrument(span)
            .await
            .inspect_err(|err| error!("session failed: {err}"))
    }

    async fn run_stages(
        &self,
        component: &Component,
    ) -> Result<SessionOutcome, SessionError> {
        if component.source().trim().is_empty() {
            return Err(SessionError::invalid_input(
                "the component source is empty",
            ));
        }

        let max_attempts = self.max_attempts();
        let extractor = Extractor::for_component(component.name());
        let mut conversation =
            Conversation::new(self.testing_type.system_message())?;
        let mut attempts = 0;
        let mut stage = Stage::AwaitingInitialDraft;
        info!(
            "generating {} tests, at most {max_attempts} attempts",
            self.testing_type
        );

        loop {
            trace!("stage: {stage:?}");
            stage = match stage {
                Stage::AwaitingInitialDraft => {
                    let candidate = self
                        .initial_draft(component, &extractor, &mut conversation)
                        .await?;
                    Stage::Testing { candidate }
                }
                Stage::Testing { candidate } => {
                    self.check_cancelled()?;
                    attempts += 1;
                    self.emit(SessionEvent::AttemptStarted(attempts));
                    let outcome = self
                        .harness
                        .run(component, &candidate)
                        .instrument(debug_span!("attempt", n = attempts))
                        .await?;

                    if outcome.passed {
                        info!("tests passed after {attempts} attempt(s)");
                        self.emit(SessionEvent::TestPassed);
                        return Ok(SessionOutcome {
                            status: Stopped::Passed,
                            attempts,
                            test_code: candidate,
                            diagnostics: String::new(),
                            conversation,
                        });
                    }

                    let diagnostics = outcome.diagnostics;
                    self.emit(SessionEvent::TestFailed {
                        diagnostics: diagnostics.clone(),
                    });
                    if attempts >= max_attempts {
                        warn!("tests still failing after {attempts} attempt(s)");
                        return Ok(SessionOutcome {
                            status: Stopped::BudgetExhausted,
                            attempts,
                            test_code: candidate,
                            diagnostics,
                            conversation,
                        });
                    }
                    debug!("attempt {attempts} failed, asking for a fix");
                    Stage::FeedbackInjected { diagnostics }
                }
                Stage::FeedbackInjected { diagnostics } => {
                    self.check_cancelled()?;
                    self.emit(SessionEvent::Regenerating);
                    let feedback = if diagnostics.trim().is_empty() {
                        NO_DIAGNOSTICS.to_owned()
                    } else {
                        diagnostics
                    };
                    conversation.push_user(feedback)?;
                    let reply = self.model_client.send(&conversation).await?;
                    conversation.push_assistant(reply.as_str())?;

                    match extractor.extract(&reply) {
                        Extraction::Code(candidate)
                            if !candidate.is_empty() =>
                        {
                            Stage::Testing { candidate }
                        }
                        _ => {
                            return Err(SessionError::extraction(format!(
                                "the reply to the diagnostics of attempt \
                                 {attempts} has no code block"
                            )));
                        }
                    }
                }
            };
        }
    }

    /// Requests the first draft. A reply without a fenced block is taken
    /// as bare code.
    async fn initial_draft(
        &self,
        component: &Component,
        extractor: &Extractor,
        conversation: &mut Conversation,
    ) -> Result<String, SessionError> {
        let excerpt = self
            .best_practices
            .excerpt(component.source(), self.testing_type.corpus())
            .await?;
        let query =
            prompt::initial_query(self.testing_type, component, &excerpt);
        conversation.push_user(query)?;

        let reply = self.model_client.send(conversation).await?;
        conversation.push_assistant(reply.as_str())?;
        match extractor.extract(&reply) {
            Extraction::Code(code) if !code.is_empty() => Ok(code),
            _ => {
                debug!("the first draft has no code block, using it as is");
                let bare = reply.trim();
                Ok(extractor
                    .rewrite_imports(bare)
                    .unwrap_or_else(|_| bare.to_owned()))
            }
        }
    }

    #[inline]
    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.cancellation.is_cancelled() {
            info!("session cancelled");
            return Err(SessionError::cancelled());
        }
        Ok(())
    }

    #[inline]
    fn emit(&self, event: SessionEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(&event);
        }
    }
}
