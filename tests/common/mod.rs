//! Shared test fixtures: a deterministic embedder standing in for the
//! encoder runtime, and a knowledge service wired to temp directories.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use knowledge_server::config::Settings;
use knowledge_server::core::embedding::{l2_normalize, Result as EmbeddingResult, TextEmbedder};
use knowledge_server::core::knowledge_service::KnowledgeService;

pub const TEST_DIMENSION: usize = 384;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "by", "of", "in", "on", "for", "to",
    "and", "or", "with",
];

/// Bag-of-words embedder: each remaining token adds weight to a dimension
/// derived from its first two letters and its length, then the vector is
/// L2-normalized. Identical text always embeds identically, shared keywords
/// land on shared dimensions, and the fixture vocabularies used by these
/// tests map to distinct dimensions.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            dimension: TEST_DIMENSION,
        }
    }

    fn token_dimension(&self, token: &str) -> usize {
        fn letter_index(c: Option<char>) -> usize {
            match c {
                Some(c) if c.is_ascii_lowercase() => (c as usize) - ('a' as usize),
                Some(c) => (c as usize) % 26,
                None => 0,
            }
        }
        let mut chars = token.chars();
        let c0 = letter_index(chars.next());
        let c1 = letter_index(chars.next());
        let len = token.chars().count().min(19);
        ((c0 * 26 + c1) * 20 + len) % self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.split_whitespace() {
            let token: String = token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            if token.is_empty() || STOPWORDS.contains(&token.as_str()) {
                continue;
            }
            let index = self.token_dimension(&token);
            vector[index] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl TextEmbedder for HashEmbedder {
    fn embed_batch(&self, texts: &[String], _batch_size: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Settings pointing every storage path into `root`.
pub fn test_settings(root: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.storage.documents_path = root.join("documents");
    settings.storage.vector_db_path = root.join("vectors");
    settings.storage.model_cache_path = root.join("models");
    settings
}

/// A knowledge service over temp storage with the deterministic embedder.
pub async fn test_service(root: &Path) -> Arc<KnowledgeService> {
    KnowledgeService::new(test_settings(root), Arc::new(HashEmbedder::new()))
        .await
        .expect("service construction")
}

/// Write an HTML file wrapping the given body text.
pub fn write_html(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("<html><body><p>{body}</p></body></html>")).unwrap();
    path
}
