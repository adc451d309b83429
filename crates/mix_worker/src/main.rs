//! Worker process for the stem mix/master pipeline.
//!
//! No CLI surface: configuration comes from an optional `settings.toml`
//! next to the process and the `MIX_*` environment variables. In a
//! deployment the queue runtime launches this binary and wires real
//! transport ports; standalone, the worker runs any stems found in the
//! configured media directory through the standard pipeline once and
//! exits - the development loop the pipeline team lives in.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use mix_core::config::Settings;
use mix_core::contracts::ContractRegistry;
use mix_core::models::JobEnvelope;
use mix_core::orchestrator::Orchestrator;
use mix_core::ports::{DirMediaSource, MemoryJobQueue, MemoryJobStore};
use mix_core::ports::{JobQueue, JobStore};
use mix_core::stages::StageRegistry;
use mix_core::worker::Worker;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings_path = Path::new("settings.toml");
    let settings = Settings::load(settings_path.exists().then_some(settings_path));

    let media_dir = settings.paths.media_dir.clone();
    if !Path::new(&media_dir).is_dir() {
        tracing::error!(
            "media directory '{media_dir}' not found; set MIX_MEDIA_DIR or [paths].media_dir"
        );
        std::process::exit(1);
    }

    let queue = Arc::new(MemoryJobQueue::new());
    let store = Arc::new(MemoryJobStore::new());
    let media = Arc::new(DirMediaSource::new(&media_dir));

    // The contract document is the sole source of truth for plan order
    // and dependencies; a deployment may point at its own copy.
    let orchestrator = match settings.pipeline.contracts_path.as_str() {
        "" => Arc::new(Orchestrator::standard()),
        path => match ContractRegistry::from_path(path) {
            Ok(contracts) => Arc::new(Orchestrator::new(
                Arc::new(contracts),
                Arc::new(StageRegistry::standard()),
            )),
            Err(e) => {
                tracing::error!("failed to load contract document '{path}': {e}");
                std::process::exit(1);
            }
        },
    };

    let worker = Arc::new(Worker::new(
        queue.clone(),
        store.clone(),
        media,
        orchestrator,
        &settings,
    ));

    let job_id = format!("local-{}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
    tracing::info!(%job_id, %media_dir, "queueing local job");
    queue.push(JobEnvelope::new(&job_id, "."));
    queue.close();

    let handles = worker.spawn(settings.worker.slots);
    for handle in handles {
        let _ = handle.join();
    }

    match store.get_status(&job_id) {
        Some(status) => {
            tracing::info!(
                status = %status.status,
                progress = status.progress,
                "job finished: {}",
                status.message
            );
            if let Some(report) = store.get_artifact(&job_id, "report.json") {
                tracing::info!("report.json: {} bytes", report.len());
            }
            if status.status != mix_core::models::JobStatus::Success {
                std::process::exit(1);
            }
        }
        None => {
            tracing::error!("job produced no status");
            std::process::exit(1);
        }
    }
}
