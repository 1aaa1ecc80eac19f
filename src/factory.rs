//! Collaborator construction
//!
//! Builds every collaborator up front from validated configuration so
//! credential and dimension problems surface before any document is
//! read. No lazy initialization.

use crate::config::{MediaMode, PipelineConfig, StorageMode, VectorStoreKind};
use crate::error::{IngestError, Result, StoreError};
use crate::input::{InputSource, LocalInputSource, ObjectStoreInputSource};
use crate::media::{DisabledDescriber, MediaDescriber, VisionDescriber};
use crate::pipeline::Orchestrator;
use crate::store::{RestIndexStore, SqliteVectorStore, VectorStore};
use crate::tokens::counter_for_model;
use crate::{artifact, embeddings};
use std::sync::Arc;
use tracing::info;

/// Build an orchestrator with all collaborators resolved from config
pub async fn build_orchestrator(config: PipelineConfig) -> Result<Orchestrator> {
    config.validate()?;

    let input = build_input(&config)?;
    let artifacts = build_artifacts(&config)?;
    let describer = build_describer(&config)?;
    let counter: Arc<dyn crate::tokens::TokenCounter> =
        Arc::from(counter_for_model(&config.embeddings.model));

    let provider = embeddings::build_provider(&config.embeddings)?;

    let store_dimensions = config
        .vector_store
        .dimensions
        .unwrap_or(config.embeddings.dimensions);
    let store: Arc<dyn VectorStore> = match config.vector_store.provider {
        VectorStoreKind::RestIndex => {
            Arc::new(RestIndexStore::new(&config.vector_store, store_dimensions)?)
        }
        VectorStoreKind::Sqlite => Arc::new(
            SqliteVectorStore::connect(&config.vector_store, store_dimensions).await?,
        ),
    };

    if store.dimensions() != provider.dimensions() {
        return Err(StoreError::DimensionMismatch {
            store: store.dimensions(),
            provider: provider.dimensions(),
        }
        .into());
    }

    if config.embeddings.integrated_vectorization && !store.supports_integrated_vectorization() {
        return Err(IngestError::ConfigInvalid(
            "configured vector store does not support integrated vectorization".to_string(),
        ));
    }

    info!(
        "Pipeline ready: {} embeddings ({} dims) into {:?} store, action {}",
        provider.model_name(),
        provider.dimensions(),
        config.vector_store.provider,
        config.action.document_action
    );

    Ok(Orchestrator::new(
        config, input, artifacts, describer, counter, provider, store,
    ))
}

fn build_input(config: &PipelineConfig) -> Result<Arc<dyn InputSource>> {
    Ok(match config.input.mode {
        StorageMode::Local => {
            let pattern = config.input.glob.as_deref().unwrap_or_default();
            Arc::new(LocalInputSource::new(pattern))
        }
        StorageMode::ObjectStore => {
            let os = config.input.object_store.clone().ok_or_else(|| {
                IngestError::ConfigInvalid("input.object_store is required".to_string())
            })?;
            Arc::new(ObjectStoreInputSource::new(os))
        }
    })
}

fn build_artifacts(config: &PipelineConfig) -> Result<Arc<dyn artifact::ArtifactStore>> {
    Ok(match config.artifacts.resolved_mode(config.input.mode) {
        StorageMode::Local => {
            let dir = config.artifacts.dir.clone().unwrap_or_else(|| "artifacts".to_string());
            Arc::new(artifact::LocalArtifactStore::new(&dir))
        }
        StorageMode::ObjectStore => {
            let os = config
                .artifacts
                .object_store
                .clone()
                .or_else(|| config.input.object_store.clone())
                .ok_or_else(|| {
                    IngestError::ConfigInvalid("artifacts.object_store is required".to_string())
                })?;
            Arc::new(artifact::ObjectStoreArtifactStore::new(os))
        }
    })
}

fn build_describer(config: &PipelineConfig) -> Result<Arc<dyn MediaDescriber>> {
    Ok(match config.media.mode {
        MediaMode::Disabled => Arc::new(DisabledDescriber),
        MediaMode::Vision => Arc::new(VisionDescriber::new(&config.media)?),
    })
}
