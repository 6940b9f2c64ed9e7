use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

use crate::catalog::{Item, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Acquisition,
    Transcode,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Acquisition => f.write_str("acquisition"),
            JobPhase::Transcode => f.write_str("transcode"),
        }
    }
}

#[derive(Debug)]
pub enum JobOutcome {
    Completed,
    /// The phase finished and started the next one for the same item.
    HandedOff(JobHandle),
    Failed(String),
    Cancelled,
    Panicked(String),
}

/// Background task driving one phase of one item.
#[derive(Debug)]
pub struct JobHandle {
    item_id: ItemId,
    phase: JobPhase,
    join: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> JobOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => JobOutcome::Cancelled,
            Err(err) => JobOutcome::Panicked(err.to_string()),
        }
    }

    /// Waits for this phase and every phase it hands off to.
    pub fn wait_all(self) -> BoxFuture<'static, JobOutcome> {
        async move {
            match self.wait().await {
                JobOutcome::HandedOff(next) => next.wait_all().await,
                outcome => outcome,
            }
        }
        .boxed()
    }
}

/// Spawns `work` on the runtime. A panic inside it is contained: the item is
/// moved to `error` and the job reports [`JobOutcome::Panicked`].
pub(crate) fn spawn_supervised<F>(item: Arc<Item>, phase: JobPhase, work: F) -> JobHandle
where
    F: Future<Output = JobOutcome> + Send + 'static,
{
    let item_id = item.id().clone();
    let join = tokio::spawn(async move {
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(item_id = %item.id(), %phase, panic = %message, "background job panicked");
                item.fail();
                JobOutcome::Panicked(message)
            }
        }
    });
    JobHandle {
        item_id,
        phase,
        join,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
