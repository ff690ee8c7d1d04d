//! Share a directory over HTTP and measure link throughput.
//!
//! ```text
//! $ hyper-dirserve --dir /srv/media --addr 0.0.0.0:8080 --speedbytes 104857600
//! $ curl http://127.0.0.1:8080/
//! $ curl -H 'Range: bytes=0-99' http://127.0.0.1:8080/movie.mkv
//! $ curl -o /dev/null http://127.0.0.1:8080/speedtest
//! ```

use std::{path::PathBuf, process};

use clap::Parser;
use hyper::server::conn::http1;
use hyper_dirserve::{DirServe, ServerConfig, DEFAULT_ADDR, DEFAULT_SPEED_TEST_BYTES};
use hyper_util::rt::TokioIo;
use tokio::{net::TcpListener, signal};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line flags, each also readable from the environment.
#[derive(Parser, Debug)]
#[command(name = "hyper-dirserve", version, about = "Share a directory over HTTP")]
struct Args {
    /// Directory to serve.
    #[arg(long, env = "DIRSERVE_DIR", default_value = ".")]
    dir: PathBuf,
    /// Address to listen on.
    #[arg(long, env = "DIRSERVE_ADDR", default_value = DEFAULT_ADDR)]
    addr: String,
    /// Bytes to stream per /speedtest run.
    #[arg(long, env = "DIRSERVE_SPEEDBYTES", default_value_t = DEFAULT_SPEED_TEST_BYTES)]
    speedbytes: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match ServerConfig::new(args.dir)
        .addr(args.addr)
        .speed_test_bytes(args.speedbytes)
        .validate()
    {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let listener = match TcpListener::bind(&config.addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("listen error: {}", err);
            process::exit(1);
        }
    };
    match listener.local_addr() {
        Ok(addr) => info!("Serving {} on http://{}", config.root.display(), addr),
        Err(_) => info!("Serving {} on http://{}", config.root.display(), config.addr),
    }

    let service = DirServe::new(config);
    loop {
        let (tcp, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    warn!("accept failed: {}", err);
                    continue;
                }
            },
            _ = signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(tcp);
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                // Clients hanging up mid-transfer land here too.
                debug!("connection from {} ended: {}", remote, err);
            }
        });
    }
}
