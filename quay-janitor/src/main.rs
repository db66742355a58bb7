use std::future::ready;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use envconfig::Envconfig;
use eyre::Result;
use quay_core::MemoryBucket;
use quay_janitor::config::Config;
use quay_janitor::janitor::Janitor;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The janitor reports liveness from its own loop: if no pass has completed
/// within a few intervals, something is wedged and the probe should fail.
#[derive(Clone)]
struct Liveness {
    last_healthy: Arc<AtomicI64>,
    deadline: Duration,
}

impl Liveness {
    fn new(deadline: Duration) -> Self {
        Self {
            last_healthy: Arc::new(AtomicI64::new(quay_core::epoch_now())),
            deadline,
        }
    }

    fn report_healthy(&self) {
        self.last_healthy
            .store(quay_core::epoch_now(), Ordering::SeqCst);
    }

    fn status(&self) -> StatusCode {
        let age = quay_core::epoch_now() - self.last_healthy.load(Ordering::SeqCst);
        if age <= self.deadline.as_secs() as i64 {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn cleanup_loop(
    janitor: Janitor,
    liveness: Liveness,
    interval_secs: u64,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {}
        }

        match janitor.run_once(&token).await {
            Ok(_) => liveness.report_healthy(),
            Err(quay_core::StorageError::Cancelled) => break,
            // A failed pass is retried on the next tick; the loop itself is
            // still alive.
            Err(e) => {
                error!("janitor failed cleanup with: {}", e);
                liveness.report_healthy();
            }
        }
    }
    info!("janitor loop exiting");
}

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn liveness_probe(State(liveness): State<Liveness>) -> StatusCode {
    liveness.status()
}

pub fn app(liveness: Liveness) -> Router {
    Router::new()
        .route("/", get(|| ready("quay janitor")))
        .route("/_readiness", get(|| ready("quay janitor")))
        .route("/_liveness", get(liveness_probe))
        .with_state(liveness)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("failed to load configuration from env");
    let settings = config.janitor_settings();
    info!("Starting janitor with ID {:?}", settings.id);

    // The in-memory bucket stands in for a real document-store backend; a
    // production deployment passes its own `DocumentStore` here.
    let store = Arc::new(MemoryBucket::new());
    let janitor = Janitor::new(store, config.storage_options(), settings)
        .await
        .expect("failed to create janitor");

    let liveness = Liveness::new(Duration::from_secs(config.cleanup_interval_secs * 4));
    let token = CancellationToken::new();

    let janitor_loop = tokio::spawn(cleanup_loop(
        janitor,
        liveness.clone(),
        config.cleanup_interval_secs,
        token.clone(),
    ));

    let bind = format!("{}:{}", config.host, config.port);
    let http_server = tokio::spawn(listen(app(liveness), bind));

    tokio::select! {
        res = janitor_loop => {
            error!("janitor loop exited");
            if let Err(e) = res {
                error!("janitor failed with: {}", e)
            }
        }
        res = http_server => {
            error!("http server exited");
            if let Err(e) = res {
                error!("server failed with: {}", e)
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            token.cancel();
        }
    }

    info!("exiting");
}
