//! Whole-batch processing
//!
//! Resolves every pending entity of a batch with bounded concurrency, then
//! records the batch outcome and optionally builds ownership trees.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::EntityResolver;
use crate::charity_commission::RegistrySource;
use crate::database::{BatchProgress, EnrichmentStore};
use crate::models::{Entity, ResolutionStatus};
use crate::ownership::OwnershipBuilder;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;
pub const DEFAULT_OWNERSHIP_DEPTH: u32 = 3;
pub const MAX_OWNERSHIP_DEPTH: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOptions {
    pub max_concurrent: usize,
    pub build_ownership_tree: bool,
    pub max_ownership_depth: u32,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            build_ownership_tree: true,
            max_ownership_depth: DEFAULT_OWNERSHIP_DEPTH,
        }
    }
}

impl ProcessOptions {
    /// Depth requested by a client: above 10 is capped, below 1 means default
    pub fn clamp_depth(requested: i64) -> u32 {
        if requested > MAX_OWNERSHIP_DEPTH as i64 {
            MAX_OWNERSHIP_DEPTH
        } else if requested < 1 {
            DEFAULT_OWNERSHIP_DEPTH
        } else {
            requested as u32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Matched,
    Unmatched,
    Failed,
}

pub struct BatchProcessor {
    store: Arc<dyn EnrichmentStore>,
    resolver: EntityResolver,
    ownership: OwnershipBuilder,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn EnrichmentStore>, registry: Arc<dyn RegistrySource>) -> Self {
        Self {
            resolver: EntityResolver::new(store.clone(), registry.clone()),
            ownership: OwnershipBuilder::new(store.clone(), registry),
            store,
        }
    }

    /// Resolve all pending entities of `batch_id` and close the batch out.
    ///
    /// Per-entity failures count as failed records. Anything else marks the
    /// batch failed with the error message and is returned.
    pub async fn process_batch(&self, batch_id: Uuid, options: ProcessOptions) -> Result<BatchProgress> {
        self.store.mark_batch_processing(batch_id).await?;
        info!(batch_id = %batch_id, "Batch processing started");

        let progress = match self.resolve_pending(batch_id, options.max_concurrent).await {
            Ok(progress) => progress,
            Err(e) => {
                error!(batch_id = %batch_id, error = %e, "Batch processing failed");
                if let Err(mark_err) = self.store.fail_batch(batch_id, &e.to_string()).await {
                    error!(batch_id = %batch_id, error = %mark_err, "Failed to mark batch failed");
                }
                return Err(e);
            }
        };

        self.store.finish_batch(batch_id, progress).await?;
        info!(
            batch_id = %batch_id,
            processed = progress.processed,
            matched = progress.matched,
            failed = progress.failed,
            status = %progress.final_status(),
            "Batch processing finished"
        );

        if options.build_ownership_tree && progress.matched > 0 {
            match self
                .ownership
                .build_trees_for_batch(batch_id, options.max_ownership_depth)
                .await
            {
                Ok(summary) => info!(
                    batch_id = %batch_id,
                    trees_built = summary.trees_built,
                    related = summary.total_related_entities,
                    "Ownership trees built"
                ),
                Err(e) => warn!(batch_id = %batch_id, error = %e, "Ownership tree building failed"),
            }
        }

        Ok(progress)
    }

    async fn resolve_pending(&self, batch_id: Uuid, max_concurrent: usize) -> Result<BatchProgress> {
        let entities = self.store.pending_entities(batch_id).await?;
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let tasks = entities.into_iter().map(|entity| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .context("Resolution semaphore closed")?;
                Ok::<_, anyhow::Error>(self.resolve_one(entity).await)
            }
        });

        let mut progress = BatchProgress::default();
        for outcome in join_all(tasks).await {
            progress.processed += 1;
            match outcome? {
                Outcome::Matched => progress.matched += 1,
                Outcome::Failed => progress.failed += 1,
                Outcome::Unmatched => {}
            }
        }
        Ok(progress)
    }

    async fn resolve_one(&self, mut entity: Entity) -> Outcome {
        match self.resolver.resolve_entity(&mut entity).await {
            Ok(()) if entity.resolution_status.is_resolved() => Outcome::Matched,
            Ok(()) => Outcome::Unmatched,
            Err(e) => {
                error!(entity_id = %entity.id, error = %e, "Entity resolution error");
                entity.resolution_status = ResolutionStatus::NoMatch;
                if let Err(save_err) = self.store.save_entity(&entity).await {
                    warn!(entity_id = %entity.id, error = %save_err, "Failed to record resolution failure");
                }
                Outcome::Failed
            }
        }
    }
}
