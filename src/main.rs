use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing_subscriber::EnvFilter;

use subsleuth::cli::Cli;
use subsleuth::config::{Config, SourceFilter};
use subsleuth::enumeration::Enumeration;
use subsleuth::graph::MemoryGraph;
use subsleuth::netutil::MemoryAsnCache;
use subsleuth::resolve::TrustDnsPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::new();
    for d in &cli.domains {
        cfg.add_domain(d);
    }
    cfg.asns = cli.asns.clone();
    cfg.provided_names = cli.names.clone();
    cfg.passive = cli.passive;
    cfg.active = cli.active;
    cfg.blacklist = cli.blacklist.clone();
    cfg.source_filter = if !cli.include_sources.is_empty() {
        SourceFilter {
            sources: cli.include_sources.clone(),
            include: true,
        }
    } else {
        SourceFilter {
            sources: cli.exclude_sources.clone(),
            include: false,
        }
    };

    let graph = Arc::new(MemoryGraph::new());
    let enumeration = Enumeration::new(
        Arc::new(cfg),
        graph.clone(),
        Arc::new(TrustDnsPool::new(cli.qps)),
        Arc::new(MemoryAsnCache::new()),
        Vec::new(),
    );

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    if let Err(e) = enumeration.start(token).await {
        error!(error = %e, "enumeration failed");
        return Err(e.into());
    }

    for name in graph.all_fqdns().await {
        println!("{name}");
    }
    Ok(())
}
