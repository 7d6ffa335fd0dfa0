use etherscribe::{init_tracing, IndexerConfig, Runner};

#[tokio::main]
async fn main() {
    let config = match IndexerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err:#}");
            std::process::exit(1);
        }
    };

    init_tracing(config.production());

    if let Err(err) = Runner::new(config).run().await {
        tracing::error!(error = %format!("{err:#}"), "indexer terminated");
        std::process::exit(1);
    }
}
