//! The listwatch worker: tweet ingestion, the scheduling cycle, the job
//! dispatcher, Discord notifications, and the HTTP job surface.

pub mod api;
pub mod context;
pub mod cron;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod notify;

pub use api::build_app;
pub use context::WorkerContext;
pub use cron::build_scheduler;
pub use cycle::{run_cycle, AnalysisOutcome, CycleReport, SkippedAnalysis, TaskOutcome};
pub use dispatcher::{
    process_job, run_manual_analysis, run_scheduled_tick, submit_job, JobRequest, JobResult,
    JobType,
};
pub use error::WorkerError;
pub use ingest::{collect_list, fetch_window, IngestReport};
pub use notify::{build_cycle_embed, DiscordNotifier, Embed, EmbedField};
