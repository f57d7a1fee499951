use std::time::Duration;

use luma_store::app_config::WorkerConfig;
use luma_store::NotificationJob;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::mailer::{render, MailSender};

/// Long-lived poll loop: fetch the next job over HTTP, deliver it, ack on
/// success, requeue on failure. Failed jobs cycle until they deliver or an
/// operator drains them.
pub async fn run(config: WorkerConfig, mailer: Box<dyn MailSender>) {
    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            error!("failed to build HTTP client: {e}");
            return;
        }
    };
    let base = config.api_base_url.trim_end_matches('/').to_string();
    let poll = Duration::from_secs(config.poll_interval_seconds.max(1));
    let idle = Duration::from_secs(config.idle_backoff_seconds.max(1));

    info!(api = %base, interval_secs = config.poll_interval_seconds, "notification worker started");

    loop {
        match fetch_next(&http, &base).await {
            Ok(Some(job)) => {
                let job_id = job.job_id;
                match deliver(mailer.as_ref(), &job).await {
                    Ok(()) => {
                        if let Err(e) = ack(&http, &base, &job).await {
                            warn!(%job_id, error = %e, "delivered but ack failed; job may redeliver");
                        }
                    }
                    Err(e) => {
                        warn!(%job_id, error = %e, "delivery failed; requeueing");
                        if let Err(e) = requeue(&http, &base, &job).await {
                            error!(%job_id, error = %e, "requeue failed; job stays in flight");
                        }
                    }
                }
                sleep(poll).await;
            }
            Ok(None) => sleep(idle).await,
            Err(e) => {
                warn!(error = %e, "job poll failed");
                sleep(idle).await;
            }
        }
    }
}

async fn fetch_next(
    http: &reqwest::Client,
    base: &str,
) -> Result<Option<NotificationJob>, reqwest::Error> {
    let resp = http.get(format!("{base}/api/jobs/next")).send().await?;
    if resp.status() == reqwest::StatusCode::NO_CONTENT {
        return Ok(None);
    }
    let resp = resp.error_for_status()?;
    Ok(Some(resp.json::<NotificationJob>().await?))
}

async fn deliver(
    mailer: &dyn MailSender,
    job: &NotificationJob,
) -> Result<(), luma_core::BoxError> {
    let (subject, body) = render(job);
    mailer.send(&job.to_email, &subject, &body).await?;
    info!(job_id = %job.job_id, order_id = job.order_id, "notification delivered");
    Ok(())
}

async fn ack(
    http: &reqwest::Client,
    base: &str,
    job: &NotificationJob,
) -> Result<(), reqwest::Error> {
    http.post(format!("{base}/api/jobs/{}/ack", job.job_id))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

async fn requeue(
    http: &reqwest::Client,
    base: &str,
    job: &NotificationJob,
) -> Result<(), reqwest::Error> {
    http.post(format!("{base}/api/jobs/requeue"))
        .json(job)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}
