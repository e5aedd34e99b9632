use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use browserless_client::BrowserlessClient;
use pagewatch_common::{load_config, AppConfig, FileConfig, PageWatchError};
use pagewatch_monitor::{
    classify::ClaudeClassifier,
    fetch::BrowserlessFetcher,
    job,
    notify::{NoopBackend, NotifyBackend, NotifyRouter},
    relevance::RelevanceCoordinator,
    store::{BaselineStore, FileBaselineStore, PgBaselineStore},
    throttle::{ErrorThrottle, DEFAULT_SWEEP_INTERVAL},
    traits::RelevanceClassifier,
    JobOutcome, JobSettings, MonitorContext, Scheduler, SchedulerConfig,
};

#[derive(Parser)]
#[command(name = "pagewatch", about = "Watch web pages for relevant changes")]
struct Cli {
    /// Path to config TOML file (overrides PAGEWATCH_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until Ctrl-C
    Run,
    /// Run one cycle for a single site and print the outcome
    Check { site_id: String },
    /// Load and validate the configuration, then exit
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let app = AppConfig::from_env()?;
    let path = cli.config.clone().unwrap_or_else(|| app.config_path.clone());
    let file = load_config(&path)?;
    file.validate()?;
    file.require_classifier(app.anthropic_api_key.is_some())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Validate => {
            println!("{}: {} site(s) OK", path.display(), file.sites.len());
            for site in &file.sites {
                println!(
                    "  {:<24} {:<6} every {}-{} min  {}",
                    site.id,
                    site.relevance_mode.to_string(),
                    site.check_min, site.check_max, site.url
                );
            }
            Ok(())
        }
        Command::Check { site_id } => {
            let site = file
                .site(&site_id)
                .cloned()
                .ok_or_else(|| PageWatchError::UnknownSite(site_id.clone()))?;
            let ctx = build_context(&app, &file).await?;

            let outcome = job::run(&ctx, &site).await?;
            print_outcome(&site_id, &outcome);
            Ok(())
        }
        Command::Run => run(&app, file).await,
    }
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("pagewatch=info".parse()?);
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

async fn run(app: &AppConfig, file: FileConfig) -> Result<()> {
    info!("pagewatch starting...");

    let ctx = Arc::new(build_context(app, &file).await?);
    let shutdown = CancellationToken::new();

    let sweeper = ctx
        .throttle
        .clone()
        .spawn_sweeper(DEFAULT_SWEEP_INTERVAL, shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received");
        }
        signal_token.cancel();
    });

    let scheduler = Scheduler::new(
        SchedulerConfig::from_monitor(&file.monitor),
        ctx,
        file.sites,
    );
    let stats = scheduler.run(shutdown).await;
    sweeper.await.context("throttle sweeper")?;

    info!("pagewatch stopped. {stats}");
    Ok(())
}

async fn build_context(app: &AppConfig, file: &FileConfig) -> Result<MonitorContext> {
    let monitor = &file.monitor;

    let client = BrowserlessClient::new(&app.browserless_url, app.browserless_token.as_deref())?;

    let store: Arc<dyn BaselineStore> = match app.database_url {
        Some(ref url) => {
            info!("Baselines stored in Postgres");
            Arc::new(PgBaselineStore::connect(url).await?)
        }
        None => {
            info!(dir = %app.baseline_dir.display(), "Baselines stored on disk");
            Arc::new(FileBaselineStore::open(&app.baseline_dir)?)
        }
    };

    let classifier: Option<Arc<dyn RelevanceClassifier>> = match app.anthropic_api_key {
        Some(ref key) => {
            let classifier = ClaudeClassifier::new(key, &app.classifier_model);
            info!(model = classifier.model(), "Classifier enabled");
            Some(Arc::new(classifier) as Arc<dyn RelevanceClassifier>)
        }
        None => {
            info!("No ANTHROPIC_API_KEY set, classifier disabled");
            None
        }
    };

    // Webhook if configured, otherwise Noop
    let notifier: Arc<dyn NotifyBackend> = match NotifyRouter::from_urls(
        app.webhook_url.as_deref(),
        app.error_webhook_url.as_deref(),
    ) {
        Some(router) => {
            info!("Webhook notifications enabled");
            Arc::new(router)
        }
        None => {
            info!("No WEBHOOK_URL set, notifications disabled");
            Arc::new(NoopBackend)
        }
    };

    let coordinator = RelevanceCoordinator::new(classifier)
        .with_char_budget(monitor.classifier_char_budget)
        .with_timeout(Duration::from_secs(monitor.classifier_timeout_secs));

    Ok(MonitorContext::builder()
        .fetcher(Arc::new(BrowserlessFetcher::new(client)))
        .store(store)
        .coordinator(coordinator)
        .notifier(notifier)
        .throttle(Arc::new(ErrorThrottle::new(monitor.error_throttle_window())))
        .settings(JobSettings::from_monitor(monitor))
        .build())
}

fn print_outcome(site_id: &str, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::BaselineCreated { fingerprint } => {
            println!("{site_id}: baseline created ({fingerprint})");
        }
        JobOutcome::Unchanged => println!("{site_id}: unchanged"),
        JobOutcome::Changed {
            fingerprint,
            evaluation,
        } => {
            println!("{site_id}: changed ({fingerprint})");
            println!("  heuristic: {}", evaluation.heuristic.detail);
            println!("  classifier invoked: {}", evaluation.classifier_invoked);
            println!("  notify: {}", evaluation.decision.notify);
            println!("  reason: {}", evaluation.decision.reason);
            if !evaluation.decision.summary.is_empty() {
                println!("  summary: {}", evaluation.decision.summary);
            }
        }
    }
}
