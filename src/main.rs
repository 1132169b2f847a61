use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use shoal::{Node, NodeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match NodeConfig::try_parse() {
        Ok(config) => config,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let node = match Node::bind(config).await {
        Ok(node) => node,
        Err(e) => {
            error!("startup failed: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = node.run().await {
        error!("node terminated: {e}");
        std::process::exit(1);
    }
}
