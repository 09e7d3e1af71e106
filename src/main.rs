use anyhow::{Context, Result};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

use magpie::bootstrap::setup::initialize;
use magpie::common::WORKER_RUNTIME;
use magpie::common::errors::handle_error;
use magpie::config::AppConfig;
use magpie::config::manifest::load_manifest;
use magpie::database::open_database;
use magpie::models::job::QueueKind;
use magpie::queue::redb::RedbQueue;
use magpie::repository::redb::RedbRepository;
use magpie::storage::ObjectStore;
use magpie::storage::fs::FsObjectStore;
use magpie::storage::http::HttpObjectStore;
use magpie::{AssetKindConfig, KindRegistry, Lifecycle, Worker};

fn build_worker(config: &AppConfig) -> Result<Worker> {
    let database = open_database(&config.database_path)?;
    let store: Arc<dyn ObjectStore> = match &config.store_endpoint {
        Some(endpoint) => Arc::new(HttpObjectStore::new(endpoint.clone())?),
        None => Arc::new(FsObjectStore::new(&config.store_root)?),
    };
    let queue = Arc::new(RedbQueue::new(database.clone(), config.visibility_timeout()));
    let repository = Arc::new(RedbRepository::new(database));

    let kinds = match &config.kinds_path {
        Some(path) => load_manifest(path, &config.staging_dir)?,
        None => {
            warn!("No kind manifest configured, serving the default \"image\" kind");
            KindRegistry::new().with(
                AssetKindConfig::builder("image")
                    .staging_dir(&config.staging_dir)
                    .build()?,
            )?
        }
    };
    info!("Serving {} asset kinds as {}", kinds.len(), config.hostname);

    Ok(Worker::new(Lifecycle::new(
        kinds,
        store,
        queue,
        repository,
        config.hostname.clone(),
    )))
}

/// Upload whatever a previous run left staged on this host.
fn recover_moved(worker: &Worker) {
    let lifecycle = worker.lifecycle();
    for kind in lifecycle.kinds().iter() {
        match lifecycle.handle_moved(kind.name()) {
            Ok(0) => {}
            Ok(count) => info!("Recovered {} staged {} assets", count, kind.name()),
            Err(err) => error!("Failed to recover staged {} assets: {}", kind.name(), err),
        }
    }
}

/// One pass over every kind's queues. Returns how many messages were handled.
fn sweep(worker: &Worker) -> usize {
    let kinds: Vec<String> = worker
        .lifecycle()
        .kinds()
        .iter()
        .map(|kind| kind.name().to_string())
        .collect();
    let mut handled = 0;
    for kind in &kinds {
        for queue in [QueueKind::Upload, QueueKind::Process] {
            handled += worker
                .drain(kind, queue)
                .iter()
                .filter(|outcome| outcome.keep_going())
                .count();
        }
    }
    handled
}

fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    initialize(&config)?;

    let start_time = Instant::now();
    let worker = build_worker(&config)
        .map_err(|error| handle_error(error.context("Failed to start worker.")))?;
    recover_moved(&worker);
    info!(duration = &*format!("{:?}", start_time.elapsed()); "Worker ready with {} loops.", config.worker_threads.max(1));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    WORKER_RUNTIME.block_on(async {
        let mut handles = Vec::new();
        for index in 0..config.worker_threads.max(1) {
            let worker = worker.clone();
            let poll_interval = config.poll_interval();
            let mut shutdown_rx = shutdown_tx.subscribe();
            handles.push(WORKER_RUNTIME.spawn(async move {
                loop {
                    let pass = worker.clone();
                    let handled = match tokio::task::spawn_blocking(move || sweep(&pass)).await {
                        Ok(handled) => handled,
                        Err(err) => {
                            error!("Worker loop {} panicked: {}", index, err);
                            0
                        }
                    };
                    if handled == 0 {
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {}
                            _ = shutdown_rx.recv() => break,
                        }
                    } else if shutdown_rx.try_recv().is_ok() {
                        break;
                    }
                }
                info!("Worker loop {} stopped", index);
            }));
        }

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")
            .map_err(handle_error)
            .ok();
        info!("Shutting down worker loops");
        let _ = shutdown_tx.send(());
        for handle in handles {
            let _ = handle.await;
        }
    });

    Ok(())
}
