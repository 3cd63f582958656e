use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use listwatch_analysis::templates::{list_templates, seed_default_templates};
use listwatch_core::{AppConfig, TemplateCategory, TemplateFilter};
use listwatch_db::{PgStore, PoolConfig, Store};
use listwatch_worker::{build_app, build_scheduler, submit_job, JobRequest, JobType, WorkerContext};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;


#[derive(Debug, Parser)]
#[command(name = "listwatch")]
#[command(about = "Twitter list ingestion and LLM analysis worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP job surface and the cron-driven cycle
    Serve,
    /// Run one job now and print its result
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Manage analysis templates
    Templates {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum RunCommands {
    /// Run a full scheduling cycle over every due task
    Cycle,
    /// Collect new tweets for one list
    Collect {
        /// List id
        #[arg(long)]
        list: String,
    },
    /// Analyze one list now, bypassing enablement and cooldown
    Analyze {
        /// List id
        #[arg(long)]
        list: String,
        /// Template id (defaults to the list's configured template)
        #[arg(long)]
        template: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum TemplateCommands {
    /// Insert the built-in templates if none exist
    Seed,
    /// List stored templates
    List {
        /// Only templates of this category
        #[arg(long)]
        category: Option<TemplateCategory>,
        /// Only active templates
        #[arg(long)]
        active: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
    /// Check database connectivity
    Ping,
    /// Seed built-in templates, then lists and tasks from the lists file
    Seed,
}

/// Analyses printed after a manual run.
const HISTORY_LIMIT: i64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = Arc::new(listwatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = PoolConfig::from_app_config(&config);
    let pool = listwatch_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to database")?;

    match command {
        Commands::Serve => serve(pool, config).await,
        Commands::Run { command } => run_job_command(pool, &config, command).await,
        Commands::Templates { command } => run_templates_command(pool, command).await,
        Commands::Db { command } => run_db_command(pool, &config, command).await,
    }
}

async fn serve(pool: PgPool, config: Arc<AppConfig>) -> anyhow::Result<()> {
    let applied = listwatch_db::run_migrations(&pool).await?;
    tracing::info!(applied, "database migrations applied");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let ctx = Arc::new(WorkerContext::from_app_config(&config, store)?);

    let _scheduler = build_scheduler(Arc::clone(&ctx), &config.cycle_cron).await?;
    let app = build_app(ctx);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn run_job_command(
    pool: PgPool,
    config: &AppConfig,
    command: RunCommands,
) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let ctx = WorkerContext::from_app_config(config, Arc::clone(&store))?;

    let (job, history_list) = match command {
        RunCommands::Cycle => (JobRequest::new(JobType::ScheduledCycle, Value::Null), None),
        RunCommands::Collect { list } => (
            JobRequest::new(JobType::CollectList, json!({ "listId": list })),
            None,
        ),
        RunCommands::Analyze { list, template } => (
            JobRequest::new(
                JobType::ManualAnalysis,
                json!({ "listId": list, "templateId": template }),
            ),
            Some(list),
        ),
    };

    let result = submit_job(&ctx, job).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(list_id) = history_list {
        println!("\nrecent analyses for {list_id}:");
        for record in store.list_analyses(Some(&list_id), HISTORY_LIMIT).await? {
            println!(
                "  {}  {:<10}  {}  {}",
                record.created_at.format("%Y-%m-%d %H:%M"),
                record.status.as_str(),
                record.id,
                record.summary.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn run_templates_command(pool: PgPool, command: TemplateCommands) -> anyhow::Result<()> {
    let store = PgStore::new(pool);
    match command {
        TemplateCommands::Seed => {
            let seeded = seed_default_templates(&store).await?;
            if seeded == 0 {
                println!("templates already present; nothing seeded");
            } else {
                println!("seeded {seeded} built-in templates");
            }
        }
        TemplateCommands::List { category, active } => {
            let filter = TemplateFilter {
                category,
                active: active.then_some(true),
            };
            let templates = list_templates(&store, filter).await?;
            if templates.is_empty() {
                println!("no templates");
            }
            for t in templates {
                println!(
                    "{}  {:<9}  {:<6}  runs={:<4}  {}",
                    t.id,
                    t.category.as_str(),
                    if t.active { "active" } else { "off" },
                    t.usage.total_runs,
                    t.name
                );
            }
        }
    }
    Ok(())
}

async fn run_db_command(pool: PgPool, config: &AppConfig, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let applied = listwatch_db::run_migrations(&pool).await?;
            println!("applied {applied} migrations");
        }
        DbCommands::Ping => {
            listwatch_db::ping(&pool).await?;
            println!("database ok");
        }
        DbCommands::Seed => {
            let store = PgStore::new(pool);
            let templates = seed_default_templates(&store).await?;
            let file = listwatch_core::load_lists(&config.lists_path)?;
            let report = listwatch_db::seed_lists(&store, &file).await?;
            println!(
                "seeded {templates} templates, {} lists, {} tasks",
                report.lists, report.tasks
            );
            for name in &report.missing_templates {
                tracing::warn!(template = %name, "seed: referenced template not found");
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
