mod cli;
mod crawler;
mod error;
mod gitlab;
mod storage;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;

use cli::{Cli, LogFormat};
use crawler::Crawler;
use storage::{Backend, Neo4jStorage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level, cli.log_format);

    info!("starting cigraph");

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("received interrupt, shutting down");
                cancel.cancel();
            }
        });
    }

    let storage: Arc<dyn Storage> = match cli.storage {
        Backend::Neo4j => {
            Arc::new(Neo4jStorage::connect(&cli.neo4j_config()?, cancel.clone()).await?)
        }
    };

    let crawler = Arc::new(Crawler::new(cli.crawler_config(), storage, cancel)?);
    crawler.crawl().await?;

    Ok(())
}

fn init_logging(level: LevelFilter, format: LogFormat) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if format == LogFormat::Json {
        builder.format(|buf, record| {
            let line = serde_json::json!({
                "time": buf.timestamp().to_string(),
                "level": record.level().to_string().to_lowercase(),
                "target": record.target(),
                "message": record.args().to_string(),
            });
            writeln!(buf, "{line}")
        });
    }

    builder.init();
}
