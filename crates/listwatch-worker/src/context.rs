//! Shared services handed to every job.

use std::sync::Arc;
use std::time::Instant;

use listwatch_analysis::{AnalysisEngine, AnalysisError, LlmConfig, OpenAiClient};
use listwatch_core::{AppConfig, UsageCounter};
use listwatch_db::Store;
use listwatch_source::{SourceConfig, TweetSource, TweetSourceClient};
use tokio::sync::{Mutex, MutexGuard};

use crate::notify::DiscordNotifier;
use crate::WorkerError;

pub struct WorkerContext {
    pub store: Arc<dyn Store>,
    pub source: Arc<dyn TweetSource>,
    pub engine: Arc<AnalysisEngine>,
    pub notifier: DiscordNotifier,
    pub usage: Arc<UsageCounter>,
    started_at: Instant,
    /// Held for the whole of a job; jobs never overlap.
    job_lock: Mutex<()>,
}

impl WorkerContext {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn TweetSource>,
        engine: Arc<AnalysisEngine>,
        notifier: DiscordNotifier,
        usage: Arc<UsageCounter>,
    ) -> Self {
        Self {
            store,
            source,
            engine,
            notifier,
            usage,
            started_at: Instant::now(),
            job_lock: Mutex::new(()),
        }
    }

    /// Wires the production HTTP clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] if an HTTP client cannot be constructed.
    pub fn from_app_config(config: &AppConfig, store: Arc<dyn Store>) -> Result<Self, WorkerError> {
        let usage = Arc::new(UsageCounter::new());

        let source = TweetSourceClient::new(SourceConfig::from_app_config(config))?;

        let model = match LlmConfig::from_app_config(config) {
            Some(llm) => Some(Arc::new(OpenAiClient::new(llm).map_err(AnalysisError::from)?)
                as Arc<dyn listwatch_analysis::ChatModel>),
            None => {
                tracing::warn!("OPENAI_API_KEY not set; analyses will be skipped");
                None
            }
        };

        let engine = AnalysisEngine::new(
            Arc::clone(&store),
            model,
            config.export_dir.clone(),
            Arc::clone(&usage),
        )?;

        let notifier =
            DiscordNotifier::new(config.discord_webhook_url.clone(), config.http_timeout_secs)?;

        Ok(Self::new(
            store,
            Arc::new(source),
            Arc::new(engine),
            notifier,
            usage,
        ))
    }

    #[must_use]
    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Waits for any running job to finish.
    pub async fn lock_jobs(&self) -> MutexGuard<'_, ()> {
        self.job_lock.lock().await
    }

    /// `None` when a job is already running.
    pub fn try_lock_jobs(&self) -> Option<MutexGuard<'_, ()>> {
        self.job_lock.try_lock().ok()
    }
}
