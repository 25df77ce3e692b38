//! Standalone mode — every subsystem in one process, backed by the
//! in-memory queue and provisioner.
//!
//! The daemon:
//! 1. Opens the request and response queues
//! 2. Creates the result store, fleet directory and metrics
//! 3. Starts the queue poller, fleet scaler and result drain under the supervisor
//! 4. Serves the gateway and API over HTTP
//! 5. On Ctrl-C, cancels waiting submissions, drains HTTP, then stops the loops

use std::sync::Arc;

use anyhow::bail;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use fleetgate_api::{ApiState, Gateway};
use fleetgate_autoscale::{FleetScaler, ResultDrain};
use fleetgate_core::FleetgateConfig;
use fleetgate_fleet::{FleetDirectory, MemoryProvisioner};
use fleetgate_metrics::ControllerMetrics;
use fleetgate_queue::{MemoryQueue, MessageQueue, QueuePoller};
use fleetgate_results::ResultStore;
use fleetgate_supervisor::Supervisor;

const MEMORY_SCHEME: &str = "memory://";

/// Open the queue behind `url`. Only in-process queues are built in.
fn open_queue(url: &str, config: &FleetgateConfig) -> anyhow::Result<Arc<dyn MessageQueue>> {
    let Some(name) = url.strip_prefix(MEMORY_SCHEME) else {
        bail!("unsupported queue url {url:?}, expected {MEMORY_SCHEME}<name>");
    };
    if name.is_empty() {
        bail!("queue url {url:?} has no queue name");
    }
    Ok(Arc::new(MemoryQueue::new(
        name,
        config.queues.visibility_timeout,
    )))
}

/// Run the controller until Ctrl-C.
pub async fn run(config: FleetgateConfig) -> anyhow::Result<()> {
    info!("fleetgate daemon starting in standalone mode");

    // ── Queues ─────────────────────────────────────────────────
    let requests = open_queue(&config.queues.request_url, &config)?;
    let responses = open_queue(&config.queues.response_url, &config)?;
    info!(
        requests = %requests.name(),
        responses = %responses.name(),
        "queues opened"
    );

    // ── Shared state ───────────────────────────────────────────
    let store = ResultStore::new();
    let metrics = Arc::new(ControllerMetrics::new());
    let provisioner = MemoryProvisioner::new(config.fleet.boot_delay);
    let directory = FleetDirectory::new(Arc::new(provisioner), config.fleet_tag());
    info!(tag = %directory.tag(), "fleet directory initialized");

    // ── Supervised loops ───────────────────────────────────────
    let supervisor = Supervisor::from_config(&config.supervisor);

    {
        let responses = responses.clone();
        let store = store.clone();
        let metrics = metrics.clone();
        let poller_config = config.poller.clone();
        supervisor
            .spawn("queue-poller", move |shutdown| {
                let poller = QueuePoller::new(
                    responses.clone(),
                    store.clone(),
                    metrics.clone(),
                    &poller_config,
                );
                async move { poller.run(shutdown).await }
            })
            .await;
    }

    {
        let requests = requests.clone();
        let directory = directory.clone();
        let metrics = metrics.clone();
        let template = config.launch_template();
        let policy = config.scaling.clone();
        supervisor
            .spawn("fleet-scaler", move |shutdown| {
                let mut scaler = FleetScaler::new(
                    requests.clone(),
                    directory.clone(),
                    template.clone(),
                    policy.clone(),
                    metrics.clone(),
                );
                async move { scaler.run(shutdown).await }
            })
            .await;
    }

    {
        let directory = directory.clone();
        let store = store.clone();
        let metrics = metrics.clone();
        let interval = config.drain.interval;
        supervisor
            .spawn("result-drain", move |shutdown| {
                let mut drain =
                    ResultDrain::new(directory.clone(), store.clone(), metrics.clone(), interval);
                async move { drain.run(shutdown).await }
            })
            .await;
    }

    // ── Gateway + API server ───────────────────────────────────
    let cancel = CancellationToken::new();
    let gateway = Gateway::new(
        requests,
        store,
        metrics.clone(),
        config.gateway.deadline,
        cancel.clone(),
    );
    let state = ApiState {
        gateway: Arc::new(gateway),
        directory,
        metrics,
    };
    let router = fleetgate_api::build_router(state, config.server.max_upload_bytes);

    let addr = config.server.listen;
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C. Waiting submissions are cancelled first
    // so their connections can complete.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        cancel.cancel();
    });

    server.await?;

    let report = supervisor.shutdown().await;
    info!(
        stopped = ?report.stopped,
        aborted = ?report.aborted,
        "fleetgate daemon stopped"
    );
    Ok(())
}
