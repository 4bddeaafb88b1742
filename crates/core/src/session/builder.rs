use std::env;
use std::sync::Arc;

use testsmith_model::ModelProvider;

use super::{CancellationToken, EventCallback, Session, SessionEvent};
use crate::harness::Harness;
use crate::model_client::ModelClient;
use crate::retrieval::{BestPracticeSource, StaticBestPractices};
use crate::runner::{JestRunner, RunnerConfig};
use crate::sandbox::Sandbox;
use crate::testing_type::{IterationBudget, TestingType};

/// [`Session`] builder.
pub struct SessionBuilder {
    model_client: ModelClient,
    harness: Option<Harness>,
    best_practices: Option<Arc<dyn BestPracticeSource>>,
    testing_type: TestingType,
    budget: IterationBudget,
    cancellation: CancellationToken,
    on_event: Option<EventCallback>,
}

impl SessionBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self::with_model_client(ModelClient::new(provider))
    }

    /// Creates a new builder sharing an existing client.
    #[inline]
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            harness: None,
            best_practices: None,
            testing_type: TestingType::default(),
            budget: IterationBudget::default(),
            cancellation: CancellationToken::default(),
            on_event: None,
        }
    }

    /// Sets the sandbox and runner. Without one, jest is run from the
    /// current directory with a sandbox in the system's temporary
    /// directory.
    #[inline]
    pub fn harness(mut self, harness: Harness) -> Self {
        self.harness = Some(harness);
        self
    }

    /// Sets where best-practice excerpts come from.
    #[inline]
    pub fn best_practices<S: BestPracticeSource + 'static>(
        mut self,
        source: S,
    ) -> Self {
        self.best_practices = Some(Arc::new(source));
        self
    }

    /// Sets the testing type.
    #[inline]
    pub fn testing_type(mut self, testing_type: TestingType) -> Self {
        self.testing_type = testing_type;
        self
    }

    /// Sets the iteration budget. Ignored by single-shot testing types.
    #[inline]
    pub fn budget(mut self, budget: IterationBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Attaches a cancellation token.
    #[inline]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attaches a callback to be invoked on progress.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Builds the session.
    pub fn build(self) -> Session {
        let SessionBuilder {
            model_client,
            harness,
            best_practices,
            testing_type,
            budget,
            cancellation,
            on_event,
        } = self;

        let harness = harness.unwrap_or_else(|| {
            Harness::new(
                Sandbox::new(env::temp_dir().join("testsmith")),
                JestRunner::new(RunnerConfig::default()),
            )
        });
        let best_practices = best_practices
            .unwrap_or_else(|| Arc::new(StaticBestPractices::default()));
        Session {
            model_client,
            harness,
            best_practices,
            testing_type,
            budget,
            cancellation,
            on_event,
        }
    }
}
