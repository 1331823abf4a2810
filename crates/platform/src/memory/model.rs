//! Deterministic model runner for local emulation.
//!
//! Embeddings are derived from a content hash so repeated runs agree; text
//! generation produces a templated echo. Both are placeholders with the
//! contract shape of the real service.

use crate::PlatformResult;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};

/// Embedding width produced by the emulated models.
const EMBEDDING_DIM: usize = 32;

#[derive(Default)]
pub(crate) struct ModelRunner;

impl ModelRunner {
    pub(crate) fn embeddings(
        &self,
        model: &str,
        texts: &[String],
    ) -> PlatformResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut hasher = Sha256::new();
                hasher.update(model.as_bytes());
                hasher.update([0u8]);
                hasher.update(text.as_bytes());
                hasher
                    .finalize()
                    .iter()
                    .take(EMBEDDING_DIM)
                    .map(|byte| f32::from(*byte) / 255.0)
                    .collect()
            })
            .collect())
    }

    pub(crate) fn text(
        &self,
        model: &str,
        prompt: &str,
        _opts: &JsonValue,
    ) -> PlatformResult<String> {
        Ok(format!("Emulated response from {model}: {prompt}"))
    }
}
