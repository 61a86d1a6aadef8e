//! Runs the job engine with the demo account and logs live updates until
//! every job has finished or Ctrl-C is pressed.
//!
//! Usage: `linkedagent-demo [settings.json]`

use std::process::ExitCode;

use linkedagent::api::{JobCreateRequest, LoginRequest};
use linkedagent::broadcast::ApplyOutcome;
use linkedagent::config::{default_settings, load_settings};
use linkedagent::job::MAX_PAGE_SIZE;
use linkedagent::session::{DEMO_EMAIL, DEMO_PASSWORD};
use linkedagent::telemetry::{init_logging, LogFormat};
use linkedagent::{Engine, JobBoard, JobQuery, SubscriptionEvent};
use log::{error, info, warn};
use tokio::sync::{mpsc, watch};

const SAMPLE_LIST: &str = "\
profile_url,name
https://www.linkedin.com/in/ada-lovelace,Ada
https://www.linkedin.com/in/grace-hopper,Grace
https://www.linkedin.com/in/alan-turing,Alan
# second batch
https://www.linkedin.com/in/ada-lovelace,Ada
https://www.linkedin.com/in/edsger-dijkstra,Edsger
";

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging(LogFormat::from_env()) {
        eprintln!("{}", e);
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> linkedagent::Result<()> {
    let settings = match std::env::args().nth(1) {
        Some(path) => load_settings(path)?,
        None => default_settings()?,
    };
    let engine = Engine::demo(settings);
    let api = engine.api();

    if !engine.session().restore() {
        api.login(&LoginRequest::new(DEMO_EMAIL, DEMO_PASSWORD))?;
    }

    engine.seed_demo_jobs()?;
    let upload = api.upload_file("sample-leads.csv", SAMPLE_LIST.as_bytes())?;
    let job = api.create_job(JobCreateRequest::for_file(upload.file_id))?;
    info!("Created job {} over {} URLs", job.id, job.total_urls);

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let subscription = api.subscribe(move |event| {
        let _ = events_tx.send(event);
    })?;

    let scheduler = engine.scheduler();
    let scheduler_handle = scheduler.start();

    let (stop_tx, mut stop_rx) = watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    }) {
        warn!("Could not install Ctrl-C handler: {}", e);
    }

    let resync_query = JobQuery::default().paged(1, MAX_PAGE_SIZE);
    let mut board = JobBoard::new();
    loop {
        tokio::select! {
            Ok(()) = stop_rx.changed() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events_rx.recv() => match event {
                Some(SubscriptionEvent::Resync) => {
                    board.replace_all(api.list_jobs(&resync_query)?.data);
                    info!("Synchronised {} jobs", board.len());
                }
                Some(SubscriptionEvent::Update(update)) => {
                    if board.apply(&update) == ApplyOutcome::Unknown {
                        board.replace_all(api.list_jobs(&resync_query)?.data);
                    }
                    if let Some(job) = board.get(&update.job_id) {
                        info!(
                            "Job {} {} {}/{} ({:.0}%)",
                            job.id,
                            job.status,
                            job.processed,
                            job.total_urls,
                            job.progress_percent()
                        );
                    }
                }
                None => break,
            },
        }

        if !board.is_empty() && board.all_terminal() {
            info!("All jobs finished");
            break;
        }
    }

    scheduler.stop();
    if let Err(e) = scheduler_handle.await {
        error!("Simulator task failed: {}", e);
    }
    subscription.close().await;

    let stats = api.stats()?;
    info!(
        "{} jobs in the last 30 days, {:.0}% success, {:.0}s average run",
        stats.jobs_last30_days,
        stats.success_rate * 100.0,
        stats.avg_duration
    );
    Ok(())
}
