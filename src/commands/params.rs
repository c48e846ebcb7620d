use anyhow::Result;

use crate::backend::{RagBackend, RetrievalParameters};

/// Push retrieval parameters to the backend's default pipeline.
#[tracing::instrument(skip(backend))]
pub async fn set_parameters<B: RagBackend>(backend: &B, params: &RetrievalParameters) -> Result<()> {
    params.validate()?;
    backend.set_parameters(params).await?;

    println!(
        "Parameters updated: temperature={} k={} chunk_overlap={} rerank_method={}{}",
        params.temperature,
        params.k,
        params.chunk_overlap,
        params.rerank_method,
        params
            .keywords
            .as_deref()
            .map(|k| format!(" keywords={}", k))
            .unwrap_or_default()
    );
    Ok(())
}
