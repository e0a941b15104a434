use crate::artifact::AnyPayload;
use crate::error::EngineError;
use crate::pool::{CancelToken, Job, JobExecutor, JobOutcome, JobStep, Priority};
use crate::storage::ArtifactStorage;
use crate::transfer::{Transfer, TransferRequest, UrlScheme};
use chrono::Utc;
use std::sync::Arc;
use tracing::warn;

/// Runs artifact jobs against the storage and transfer collaborators
pub struct ArtifactExecutor {
    storage: Arc<dyn ArtifactStorage>,
    transfer: Arc<dyn Transfer>,
    urls: UrlScheme,
}

impl ArtifactExecutor {
    pub fn new(storage: Arc<dyn ArtifactStorage>, transfer: Arc<dyn Transfer>, urls: UrlScheme) -> Self {
        ArtifactExecutor {
            storage,
            transfer,
            urls,
        }
    }

    fn load(&self, job: &Job) -> JobOutcome {
        match self.storage.load(job.kind, &job.locator) {
            Ok(Some(stored)) => match AnyPayload::parse(job.kind, &stored.bytes) {
                Ok(payload) => JobOutcome::Loaded {
                    payload,
                    fetched: stored.modified,
                },
                Err(e) => {
                    // Unusable on disk: behave as if missing so a download replaces it
                    warn!("Ignoring corrupt {} on disk for {}: {}", job.kind, job.locator, e);
                    JobOutcome::NotFound
                }
            },
            Ok(None) => JobOutcome::NotFound,
            Err(e) => JobOutcome::Failed(e.to_string()),
        }
    }

    fn fetch(&self, job: &Job, cancel: &CancelToken) -> JobOutcome {
        let request = TransferRequest {
            url: self.urls.url_for(job.kind, &job.locator),
            high_priority: job.priority == Priority::High,
        };

        let bytes = match self.transfer.fetch(&request, cancel) {
            Ok(bytes) => bytes,
            Err(EngineError::Cancelled) => return JobOutcome::Cancelled,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        if cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }

        let payload = match AnyPayload::parse(job.kind, &bytes) {
            Ok(payload) => payload,
            Err(e) => return JobOutcome::Failed(format!("{}: {}", request.url, e)),
        };

        if let Err(e) = self.storage.save(job.kind, &job.locator, &bytes) {
            warn!("Could not save {} for {}: {}", job.kind, job.locator, e);
        }

        JobOutcome::Loaded {
            payload,
            fetched: Utc::now(),
        }
    }
}

impl JobExecutor for ArtifactExecutor {
    fn execute(&self, job: &Job, cancel: &CancelToken) -> JobOutcome {
        match job.step {
            JobStep::DiskLoad => self.load(job),
            JobStep::NetworkFetch => self.fetch(job, cancel),
        }
    }
}
