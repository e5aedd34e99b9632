use ai_client::truncate_chars;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use pagewatch_common::{Baseline, Notice, NoticeKind, RelevanceMode, SiteConfig};

use crate::context::MonitorContext;
use crate::fingerprint::{fingerprint_content, Fingerprint};
use crate::relevance::Evaluation;
use crate::store::StoreError;
use crate::traits::FetchError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one cycle did for a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// First observation; no relevance evaluation ran.
    BaselineCreated { fingerprint: String },
    Unchanged,
    /// The baseline was replaced; `evaluation.decision.notify` says whether a notice went out.
    Changed {
        fingerprint: String,
        evaluation: Evaluation,
    },
}

impl JobOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            JobOutcome::BaselineCreated { .. } => "baseline_created",
            JobOutcome::Unchanged => "unchanged",
            JobOutcome::Changed { .. } => "changed",
        }
    }
}

/// Run one full evaluation cycle for `site`.
///
/// Failures are reported through the error throttle and notifier, then returned
/// so the scheduler can log and reschedule.
pub async fn run(ctx: &MonitorContext, site: &SiteConfig) -> Result<JobOutcome, JobError> {
    match run_cycle(ctx, site).await {
        Ok(outcome) => {
            debug!(site = %site.id, outcome = outcome.label(), "Site job complete");
            Ok(outcome)
        }
        Err(e) => {
            report_error(ctx, site, &e).await;
            Err(e)
        }
    }
}

async fn run_cycle(ctx: &MonitorContext, site: &SiteConfig) -> Result<JobOutcome, JobError> {
    let raw = fetch_with_retry(ctx, site).await?;
    let Fingerprint { text, digest } = fingerprint_content(&raw, &site.scrub_patterns);

    let Some(previous) = ctx.store.read(&site.id).await? else {
        ctx.store.write(&site.id, &baseline(&digest, &text)).await?;
        info!(site = %site.id, fingerprint = %digest, "Baseline created");

        if ctx.settings.notify_on_baseline(site) {
            deliver(ctx, Notice::new(NoticeKind::Baseline, site).summary(excerpt(&text))).await;
        }
        return Ok(JobOutcome::BaselineCreated {
            fingerprint: digest,
        });
    };

    if previous.fingerprint == digest {
        debug!(site = %site.id, "Fingerprint unchanged");
        return Ok(JobOutcome::Unchanged);
    }

    info!(site = %site.id, old = %previous.fingerprint, new = %digest, "Content changed");
    let evaluation = ctx.coordinator.evaluate(site, &previous.text, &text).await;

    ctx.store.write(&site.id, &baseline(&digest, &text)).await?;

    if evaluation.decision.notify {
        let kind = match site.relevance_mode {
            RelevanceMode::Strict => NoticeKind::Relevant,
            RelevanceMode::Loose => NoticeKind::Loose,
        };
        deliver(
            ctx,
            Notice::new(kind, site)
                .reason(evaluation.decision.reason.clone())
                .summary(evaluation.decision.summary.clone()),
        )
        .await;
    } else {
        info!(site = %site.id, reason = %evaluation.decision.reason, "Change not relevant");
    }

    Ok(JobOutcome::Changed {
        fingerprint: digest,
        evaluation,
    })
}

/// One retry after `retry_delay`, on timeouts only.
async fn fetch_with_retry(ctx: &MonitorContext, site: &SiteConfig) -> Result<String, FetchError> {
    let request = ctx.settings.fetch_request(site);

    match ctx.fetcher.fetch(&request).await {
        Err(e) if e.is_timeout() => {
            warn!(site = %site.id, error = %e, delay = ?ctx.settings.retry_delay, "Fetch timed out, retrying once");
            tokio::time::sleep(ctx.settings.retry_delay).await;
            ctx.fetcher.fetch(&request).await
        }
        other => other,
    }
}

async fn report_error(ctx: &MonitorContext, site: &SiteConfig, error: &JobError) {
    if ctx.throttle.should_throttle(&site.id) {
        debug!(site = %site.id, error = %error, "Error notice throttled");
        return;
    }
    warn!(site = %site.id, error = %error, "Site job failed");
    deliver(ctx, Notice::new(NoticeKind::Error, site).reason(error.to_string())).await;
}

async fn deliver(ctx: &MonitorContext, notice: Notice) {
    if let Err(e) = ctx.notifier.send(&notice).await {
        warn!(site = %notice.site_id, kind = %notice.kind, error = %e, "Notification delivery failed");
    }
}

fn baseline(digest: &str, text: &str) -> Baseline {
    Baseline {
        fingerprint: digest.to_string(),
        text: text.to_string(),
        last_checked: Utc::now(),
    }
}

fn excerpt(text: &str) -> String {
    const MAX_CHARS: usize = 280;
    let cut = truncate_chars(text, MAX_CHARS);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
