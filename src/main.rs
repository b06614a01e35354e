//! Wiretap CLI

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;
use wiretap::client::Client;
use wiretap::config::Config;
use wiretap::dump::Renderer;
use wiretap::server::Server;
use wiretap::transport::HyperTransport;
use wiretap::{InboundInterceptor, OutboundInterceptor};

fn usage() -> ! {
    eprintln!("Wiretap v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: wiretap <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  fetch <url>       GET <url> and dump the exchange");
    eprintln!("  listen [addr]     Answer 404 to everything and dump each exchange");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>   TOML configuration file");
    eprintln!();
    eprintln!("Set RUST_LOG to control diagnostics (e.g. RUST_LOG=wiretap=debug).");
    process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        usage();
    }

    if let Err(e) = run(&args).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: &[String]) -> anyhow::Result<()> {
    let mut config_path: Option<PathBuf> = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let Some(path) = iter.next() else {
                bail!("--config requires a file argument");
            };
            config_path = Some(PathBuf::from(path));
        } else {
            positional.push(arg.as_str());
        }
    }

    let config = match &config_path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    config.install_output().context("opening dump output")?;
    let renderer = Renderer::from(&config.dump);

    match positional.as_slice() {
        ["fetch", url] => {
            let transport = HyperTransport::from_config(&config.client)?;
            let client = Client::new(OutboundInterceptor::new(transport).with_renderer(renderer));
            client.get(url).await.with_context(|| format!("fetching {url}"))?;
        }
        ["listen"] => listen(config.server.listen, renderer).await?,
        ["listen", addr] => {
            let addr: SocketAddr = addr
                .parse()
                .with_context(|| format!("invalid listen address {addr}"))?;
            listen(addr, renderer).await?;
        }
        [command, ..] => bail!("Unknown command: {command}. Run 'wiretap' for usage information."),
        [] => usage(),
    }

    Ok(())
}

async fn listen(addr: SocketAddr, renderer: Renderer) -> anyhow::Result<()> {
    let handler = InboundInterceptor::default().with_renderer(renderer);
    let server = Server::bind(addr, handler)
        .await
        .with_context(|| format!("binding {addr}"))?;

    eprintln!("Dumping requests sent to {}", server.url());
    tokio::signal::ctrl_c().await?;
    server.shutdown().await;
    Ok(())
}
