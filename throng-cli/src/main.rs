mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use metrics_exporter_prometheus::PrometheusBuilder;
use throng::Run;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.enable_logging);

    if let Some(addr) = cli.prometheus {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Unable to start the Prometheus exporter")?;
        info!("Serving metrics on http://{addr}/metrics");
    }

    let stats = Run::new(cli.config())
        .shutdown_on(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Unable to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{stats}");
    }

    Ok(())
}

fn init_tracing(enable_logging: bool) {
    let default = if enable_logging {
        "throng=debug"
    } else {
        "throng=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    FmtSubscriber::builder().with_env_filter(filter).init();
}
