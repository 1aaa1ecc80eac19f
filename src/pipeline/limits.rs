//! Concurrency limits for the pipeline
//!
//! Three independent counting semaphores bound document, page, and
//! embedding-batch parallelism; a fourth serializes vision calls.
//! Permits release on every exit path, including panics.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Semaphore set sized from configuration
#[derive(Clone, Debug)]
pub struct ConcurrencyLimits {
    docs: Arc<Semaphore>,
    pages: Arc<Semaphore>,
    embeds: Arc<Semaphore>,
    vision: Arc<Semaphore>,
    max_docs: usize,
}

/// A held permit; returns to its semaphore on drop
pub struct Permit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ConcurrencyLimits {
    pub fn new(max_docs: usize, max_pages: usize, max_embeds: usize) -> Self {
        debug!(
            "Concurrency limits: {} docs, {} pages, {} embed batches, 1 vision",
            max_docs, max_pages, max_embeds
        );
        Self {
            docs: Arc::new(Semaphore::new(max_docs)),
            pages: Arc::new(Semaphore::new(max_pages)),
            embeds: Arc::new(Semaphore::new(max_embeds)),
            vision: Arc::new(Semaphore::new(1)),
            max_docs,
        }
    }

    pub async fn acquire_doc(&self) -> Permit {
        Self::acquire(&self.docs).await
    }

    pub async fn acquire_page(&self) -> Permit {
        Self::acquire(&self.pages).await
    }

    pub async fn acquire_embed(&self) -> Permit {
        Self::acquire(&self.embeds).await
    }

    pub async fn acquire_vision(&self) -> Permit {
        Self::acquire(&self.vision).await
    }

    async fn acquire(semaphore: &Arc<Semaphore>) -> Permit {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("Semaphore should not be closed");
        Permit { _permit: permit }
    }

    pub fn max_docs(&self) -> usize {
        self.max_docs
    }

    pub fn available_docs(&self) -> usize {
        self.docs.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn test_permits_release_on_drop() {
        let limits = ConcurrencyLimits::new(2, 1, 1);

        let p1 = limits.acquire_doc().await;
        let p2 = limits.acquire_doc().await;
        assert_eq!(limits.available_docs(), 0);

        drop(p1);
        assert_eq!(limits.available_docs(), 1);
        drop(p2);
        assert_eq!(limits.available_docs(), 2);
    }

    #[tokio::test]
    async fn test_doc_limit_blocks() {
        let limits = ConcurrencyLimits::new(1, 1, 1);
        let held = limits.acquire_doc().await;

        let limits_clone = limits.clone();
        let task = tokio::spawn(async move {
            let _p = limits_clone.acquire_doc().await;
            "acquired"
        });

        sleep(Duration::from_millis(10)).await;
        assert!(!task.is_finished());

        drop(held);
        assert_eq!(task.await.unwrap(), "acquired");
    }

    #[tokio::test]
    async fn test_levels_are_independent() {
        let limits = ConcurrencyLimits::new(1, 1, 1);
        let _doc = limits.acquire_doc().await;
        // Page and embed permits are not starved by the doc permit
        let _page = limits.acquire_page().await;
        let _embed = limits.acquire_embed().await;
        let _vision = limits.acquire_vision().await;
    }
}
