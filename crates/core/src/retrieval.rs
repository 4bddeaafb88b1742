//! Best-practice retrieval by embedding similarity.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use testsmith_model::EmbeddingProvider;

use crate::model_client::GatewayError;

/// How many documents make up an excerpt.
pub const TOP_K: usize = 3;

/// Best practices could not be retrieved.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// The component could not be embedded.
    #[error("failed to embed the component: {0}")]
    Embedding(#[from] GatewayError),
    /// The corpus index could not be loaded.
    #[error("failed to load the {corpus:?} corpus: {reason}")]
    Index {
        /// The corpus name.
        corpus: String,
        /// What went wrong.
        reason: String,
    },
    /// Nothing was found.
    #[error("no best practices found in the {0:?} corpus")]
    NoMatch(String),
}

/// Supplies the best-practice excerpt quoted in the initial prompt.
#[async_trait]
pub trait BestPracticeSource: Send + Sync {
    /// Returns the excerpt most relevant to `component_source`, taken from
    /// the named corpus.
    async fn excerpt(
        &self,
        component_source: &str,
        corpus: &str,
    ) -> Result<String, RetrievalError>;
}

/// A stored best-practice document.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Document {
    /// Row identifier, numeric ids are kept in their decimal form.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Optional title.
    #[serde(default)]
    pub title: Option<String>,
    /// The text quoted in prompts.
    pub content: String,
    /// The embedding of `content`.
    #[serde(deserialize_with = "deserialize_embedding")]
    pub embedding: Vec<f32>,
}

fn deserialize_id<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<String, D::Error> {
    match Value::deserialize(de)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

/// Embeddings are stored either as arrays or as strings holding a JSON
/// array.
fn deserialize_embedding<'de, D: Deserializer<'de>>(
    de: D,
) -> Result<Vec<f32>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Vector(Vec<f32>),
        Text(String),
    }

    match Stored::deserialize(de)? {
        Stored::Vector(vector) => Ok(vector),
        Stored::Text(text) => {
            serde_json::from_str(&text).map_err(serde::de::Error::custom)
        }
    }
}

/// A document and its similarity to a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scored<'a> {
    /// The matching document.
    pub document: &'a Document,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// An in-memory corpus searchable by cosine similarity.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingIndex {
    documents: Vec<Document>,
}

impl EmbeddingIndex {
    /// Creates an index over `documents`.
    #[inline]
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    /// Parses a JSON array of documents.
    #[inline]
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads and parses the JSON file at `path`.
    pub async fn load(path: &Path) -> Result<Self, String> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| format!("{}: {err}", path.display()))?;
        let index = Self::from_json(&json)
            .map_err(|err| format!("{}: {err}", path.display()))?;
        debug!(
            "loaded {} documents from {}",
            index.documents.len(),
            path.display()
        );
        Ok(index)
    }

    /// Returns all documents.
    #[inline]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Returns the `k` documents most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Scored<'_>> {
        let mut scored: Vec<_> = self
            .documents
            .iter()
            .map(|document| Scored {
                document,
                similarity: cosine_similarity(query, &document.embedding),
            })
            .collect();
        scored.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        scored.truncate(k);
        scored
    }
}

/// Cosine similarity of two vectors. Vectors of different length, and
/// zero vectors, score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
        (0.0f32, 0.0f32, 0.0f32),
        |(dot, norm_a, norm_b), (x, y)| {
            (dot + x * y, norm_a + x * x, norm_b + y * y)
        },
    );
    let magnitude = norm_a.sqrt() * norm_b.sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    dot / magnitude
}

/// Embeds the component and searches `<dir>/<corpus>.json`.
pub struct IndexedBestPractices<E> {
    embedder: E,
    dir: PathBuf,
}

impl<E: EmbeddingProvider> IndexedBestPractices<E> {
    /// Creates a source reading corpus files from `dir`.
    #[inline]
    pub fn new<P: Into<PathBuf>>(embedder: E, dir: P) -> Self {
        Self {
            embedder,
            dir: dir.into(),
        }
    }

    fn corpus_path(&self, corpus: &str) -> Result<PathBuf, RetrievalError> {
        let valid = !corpus.is_empty()
            && corpus
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(RetrievalError::Index {
                corpus: corpus.to_owned(),
                reason: "invalid corpus name".to_owned(),
            });
        }
        Ok(self.dir.join(format!("{corpus}.json")))
    }
}

#[async_trait]
impl<E: EmbeddingProvider> BestPracticeSource for IndexedBestPractices<E> {
    async fn excerpt(
        &self,
        component_source: &str,
        corpus: &str,
    ) -> Result<String, RetrievalError> {
        let path = self.corpus_path(corpus)?;
        let query =
            self.embedder.embed(component_source).await.map_err(|err| {
                error!("failed to embed the component: {err}");
                GatewayError::from_provider_error(&err)
            })?;
        let index = EmbeddingIndex::load(&path).await.map_err(|reason| {
            RetrievalError::Index {
                corpus: corpus.to_owned(),
                reason,
            }
        })?;

        let hits = index.search(&query, TOP_K);
        for hit in &hits {
            trace!("matched {} ({:.3})", hit.document.id, hit.similarity);
        }
        let excerpt = hits
            .iter()
            .map(|hit| hit.document.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if excerpt.trim().is_empty() {
            return Err(RetrievalError::NoMatch(corpus.to_owned()));
        }
        Ok(excerpt)
    }
}

/// Always returns the same excerpt.
#[derive(Clone, Debug)]
pub struct StaticBestPractices(String);

impl StaticBestPractices {
    /// Creates a source returning `excerpt` for every corpus.
    #[inline]
    pub fn new<S: Into<String>>(excerpt: S) -> Self {
        Self(excerpt.into())
    }
}

impl Default for StaticBestPractices {
    fn default() -> Self {
        Self::new(
            "Test behaviour through the public interface. Keep each test \
focused on one expectation. Isolate the unit under test by stubbing its \
collaborators.",
        )
    }
}

#[async_trait]
impl BestPracticeSource for StaticBestPractices {
    async fn excerpt(
        &self,
        _component_source: &str,
        corpus: &str,
    ) -> Result<String, RetrievalError> {
        if self.0.trim().is_empty() {
            return Err(RetrievalError::NoMatch(corpus.to_owned()));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::fmt;
    use std::future::ready;

    use pretty_assertions::assert_eq;
    use testsmith_model::{ErrorKind, ModelProviderError};

    use super::*;

    #[derive(Debug)]
    struct FakeEmbedderError;

    impl fmt::Display for FakeEmbedderError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "embedding failed")
        }
    }

    impl std::error::Error for FakeEmbedderError {}

    impl ModelProviderError for FakeEmbedderError {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }

        fn provider(&self) -> &str {
            "fake"
        }
    }

    struct FakeEmbedder(Option<Vec<f32>>);

    impl EmbeddingProvider for FakeEmbedder {
        type Error = FakeEmbedderError;

        fn embed(
            &self,
            _input: &str,
        ) -> impl Future<Output = Result<Vec<f32>, Self::Error>> + Send + 'static
        {
            ready(self.0.clone().ok_or(FakeEmbedderError))
        }
    }

    const CORPUS: &str = r#"[
        { "id": 1, "title": "a", "content": "alpha", "embedding": [1.0, 0.0] },
        { "id": "2", "content": "beta", "embedding": "[0.0, 1.0]" },
        { "id": 3, "content": "gamma", "embedding": [0.7, 0.7] },
        { "id": 4, "content": "delta", "embedding": [-1.0, 0.0] },
        { "id": 5, "content": "broken", "embedding": [1.0, 0.0, 0.0] }
    ]"#;

    #[test]
    fn test_cosine_similarity() {
        let close = |a: f32, b: f32| (a - b).abs() < 1e-6;
        assert!(close(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]), 1.0));
        assert!(close(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]), 0.0));
        assert!(close(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0));
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_documents() {
        let index = EmbeddingIndex::from_json(CORPUS).unwrap();
        let docs = index.documents();
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0].id, "1");
        assert_eq!(docs[0].title.as_deref(), Some("a"));
        assert_eq!(docs[1].id, "2");
        assert_eq!(docs[1].embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_search_top_k() {
        let index = EmbeddingIndex::from_json(CORPUS).unwrap();
        let ids: Vec<_> = index
            .search(&[1.0, 0.1], TOP_K)
            .iter()
            .map(|hit| hit.document.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3", "2"]);
    }

    #[tokio::test]
    async fn test_indexed_best_practices() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("testing.json"), CORPUS).unwrap();
        let embedder = FakeEmbedder(Some(vec![0.0, 1.0]));
        let source = IndexedBestPractices::new(embedder, dir.path());
        let excerpt =
            source.excerpt("export default {}", "testing").await.unwrap();
        assert_eq!(excerpt, "beta gamma alpha");
    }

    #[tokio::test]
    async fn test_indexed_best_practices_errors() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = FakeEmbedder(Some(vec![1.0]));
        let source = IndexedBestPractices::new(embedder, dir.path());
        assert!(matches!(
            source.excerpt("x", "missing").await,
            Err(RetrievalError::Index { .. })
        ));
        assert!(matches!(
            source.excerpt("x", "../etc").await,
            Err(RetrievalError::Index { .. })
        ));

        std::fs::write(dir.path().join("empty.json"), "[]").unwrap();
        assert!(matches!(
            source.excerpt("x", "empty").await,
            Err(RetrievalError::NoMatch(_))
        ));

        let source = IndexedBestPractices::new(FakeEmbedder(None), dir.path());
        let err = source.excerpt("x", "empty").await.unwrap_err();
        let RetrievalError::Embedding(err) = err else {
            panic!("expected an embedding error");
        };
        assert_eq!(err.provider(), "fake");
    }

    #[tokio::test]
    async fn test_static_best_practices() {
        let source = StaticBestPractices::new("Use shallowMount.");
        assert_eq!(
            source.excerpt("x", "testing").await.unwrap(),
            "Use shallowMount."
        );
        let empty = StaticBestPractices::new(" ");
        assert!(empty.excerpt("x", "testing").await.is_err());
    }
}
