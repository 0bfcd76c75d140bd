//! pulse-agent - samples process and host metrics and ships them to a collector.

use std::sync::Arc;

use clap::Parser;
use pulse_agent::{Agent, AgentConfig, DeliveryClient, Poller, ProcessPoller, SystemPoller};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("pulse_agent=info".parse()?))
        .init();

    let config = AgentConfig::parse();
    let settings = config.settings()?;

    let transport = DeliveryClient::new(&config.address, config.signing_key().map(str::to_string))?;
    info!(
        collector = %transport.base_url(),
        signed = config.signing_key().is_some(),
        "starting pulse-agent"
    );

    let pollers: Vec<Arc<dyn Poller>> = vec![
        Arc::new(ProcessPoller::with_sysinfo()?),
        Arc::new(SystemPoller::with_sysinfo()),
    ];
    let agent = Agent::new(pollers, Arc::new(transport), settings)?;

    let cancel = CancellationToken::new();
    let running = tokio::spawn(agent.run(cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    cancel.cancel();

    let report = running.await?;
    info!(
        delivered = report.batches_delivered,
        failed = report.batches_failed,
        dropped = report.batches_dropped,
        "pulse-agent stopped"
    );
    Ok(())
}
