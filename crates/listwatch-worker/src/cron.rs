//! Background job scheduler.
//!
//! Registers the recurring scheduling cycle on a [`JobScheduler`]. Ticks
//! that arrive while another job is still running are dropped.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::context::WorkerContext;
use crate::dispatcher::run_scheduled_tick;

/// Builds and starts the scheduler with the cycle job on `cycle_cron`.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    ctx: Arc<WorkerContext>,
    cycle_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_cycle_job(&scheduler, ctx, cycle_cron).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

async fn register_cycle_job(
    scheduler: &JobScheduler,
    ctx: Arc<WorkerContext>,
    cycle_cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cycle_cron, move |_uuid, _lock| {
        let ctx = Arc::clone(&ctx);

        Box::pin(async move {
            match run_scheduled_tick(&ctx).await {
                None | Some(Ok(_)) => {}
                // Already logged and recorded by the dispatcher.
                Some(Err(e)) => tracing::debug!(error = %e, "scheduler: cycle tick failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron = cycle_cron, "scheduler: registered cycle job");
    Ok(())
}
