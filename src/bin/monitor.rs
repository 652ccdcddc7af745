use std::sync::Arc;

use clap::Parser;
use system_monitor::{
    config::{Config, read_config_file},
    monitors::SystemSampler,
    pipeline::Pipeline,
    storage::MemoryStore,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file, defaults are used when omitted
    #[arg(short)]
    file: Option<String>,

    /// Directory with the dashboard assets
    #[arg(long, default_value = "static")]
    static_dir: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("system_monitor", LevelFilter::DEBUG),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(path) => read_config_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides();
    config.validate()?;

    let sampler = SystemSampler::new(&config.disk_mount);
    let storage = Arc::new(MemoryStore::new(
        config.storage.capacity,
        config.storage.retention(),
    ));

    let pipeline = Pipeline::spawn(&config, Box::new(sampler), storage);

    #[cfg(feature = "api")]
    {
        use system_monitor::api::{ApiConfig, ApiState, spawn_api_server};

        let api = ApiConfig {
            bind_addr: std::net::SocketAddr::new(config.api.addr, config.api.port),
            enable_cors: true,
            static_dir: Some(args.static_dir.clone().into()),
        };
        let addr = spawn_api_server(api, ApiState::new(pipeline.clone())).await?;
        info!("Dashboard available at: http://{addr}");
    }

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");

    pipeline.shutdown().await;

    Ok(())
}
