use anyhow::Context;
use log::warn;
use netsweep::config::{self, Config};
use netsweep::credentials::StaticCredentials;
use netsweep::logging::init_logging;
use netsweep::net::inspect::SshLogInspector;
use netsweep::net::ping::select_prober;
use netsweep::net::port::TcpConnectScanner;
use netsweep::orchestrator::{Capabilities, Orchestrator};
use netsweep::report::{write_results, OutputFormat};
use rustrc::ssh::HostKeyPolicy;
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let matches = config::command().get_matches();
    let config = Config::try_from(&matches).context("invalid configuration")?;

    if config.host_key_policy == HostKeyPolicy::AcceptAny {
        warn!("SSH host key verification is disabled for this sweep");
    }

    let caps = Capabilities {
        prober: select_prober(config.prober).context("no usable liveness prober")?,
        scanner: Arc::new(TcpConnectScanner),
        inspector: Arc::new(SshLogInspector::new(
            config.params.ssh_port,
            config.session_timeout,
            config.host_key_policy.clone(),
        )),
        credentials: Arc::new(StaticCredentials::new(config.credentials.clone())),
    };

    // Text output is streamed while the sweep runs, the other formats are
    // written once every host is done.
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let events = (config.format == OutputFormat::Text).then_some(sender);
    let printer = tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            println!("{}", event);
        }
    });

    let orchestrator = Orchestrator::with_events(config.subnet, config.params, caps, events);

    let shutdown = orchestrator.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sweep");
            shutdown.trigger();
        }
    });

    let results = orchestrator.sweep().await;
    drop(orchestrator);
    printer.await.context("output task failed")?;

    write_results(config.format, &results, std::io::stdout().lock())
        .context("failed to write results")?;

    Ok(())
}
