use collab_loadtest::config::Config;
use collab_loadtest::identity::Identity;
use collab_loadtest::plan::PlanKind;
use collab_loadtest::platform::HttpPlatformFactory;
use collab_loadtest::{Orchestrator, login_users};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shortest allowed interval between progress reports
const MIN_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Log in every configured account once and fail if any is rejected
async fn check_users(config: &Config, platforms: &HttpPlatformFactory) -> anyhow::Result<()> {
    let identities: Vec<Identity> = (0..config.run.users)
        .map(|id| Identity::for_id(id, &config.users))
        .collect();

    let result = login_users(platforms, &config.connection.server_url, &identities).await;
    for (email, err) in &result.errors {
        warn!("{}: {}", email, err);
    }
    if !result.all_succeeded() {
        anyhow::bail!(
            "{} of {} users failed to log in",
            result.errors.len(),
            identities.len()
        );
    }

    info!("All {} users logged in", identities.len());
    Ok(())
}

/// Resolves when the configured run length is over; never without one
async fn run_length(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "collab_loadtest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = Config::from_env();
    config.validate()?;
    info!(
        "Loaded configuration: server={}, plan={}, users={}",
        config.connection.server_url, config.plan.kind, config.run.users
    );

    if let Some(addr) = config.run.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Prometheus metrics listening on {}", addr);
    }

    let platforms = HttpPlatformFactory::new(config.connection.request_timeout)?;

    if std::env::args().nth(1).as_deref() == Some("check-users") {
        return check_users(&config, &platforms).await;
    }

    let kind = PlanKind::parse(&config.plan.kind)?;
    let config = Arc::new(config);
    let factory = kind.build(config.clone(), Arc::new(platforms));

    let mut orchestrator = Orchestrator::new(config.clone());
    info!(run_id = %orchestrator.run_id(), "Starting load test");
    orchestrator
        .launch(factory.as_ref(), config.run.users)
        .await?;

    // Periodic progress report
    let stats = orchestrator.stats_handle();
    let report_interval = config.run.report_interval.max(MIN_REPORT_INTERVAL);
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(report_interval);
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("{}", stats.read().await.report_line());
        }
    });

    tokio::select! {
        _ = run_length(config.run.duration) => info!("Run duration elapsed, stopping"),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Interrupt received, stopping");
        }
    }

    reporter.abort();
    let summary = orchestrator.shutdown(config.run.shutdown_grace).await;
    summary.report();
    println!("{}", summary.to_json()?);

    Ok(())
}
