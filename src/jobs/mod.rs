//! # Background Jobs
//!
//! Fire-and-forget execution of named units of work. Callers hand a [`Job`]
//! to a [`JobQueue`] and never wait for it; the queue decides when and where
//! it runs.

pub mod queue;

pub use queue::{InProcessJobQueue, JobQueueHandle};

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;

/// The future a job runs
pub type JobAction = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// A named unit of work with its action already bound to its inputs
pub struct Job {
    name: String,
    action: JobAction,
}

impl Job {
    pub fn new<N, F>(name: N, action: F) -> Self
    where
        N: Into<String>,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self { name: name.into(), action: Box::pin(action) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, JobAction) {
        (self.name, self.action)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Why a job was not accepted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobQueueError {
    #[error("job queue is full, rejected job '{job}'")]
    QueueFull { job: String },

    #[error("job queue is shut down, rejected job '{job}'")]
    QueueClosed { job: String },
}

impl JobQueueError {
    /// Short label used for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::QueueFull { .. } => "queue_full",
            Self::QueueClosed { .. } => "queue_closed",
        }
    }
}

/// Accepts jobs for asynchronous execution.
///
/// `enqueue` must not block and must not wait for the job to run.
pub trait JobQueue: Send + Sync {
    fn enqueue(&self, job: Job) -> std::result::Result<(), JobQueueError>;
}
