//! echoframe-cli - Command-line interface for echoframe
//!
//! One-shot commands against a running echoframe server.

use clap::{Parser, Subcommand};
use echoframe_client::{Client, ConnectionConfig};
use echoframe_protocol::ReplyMode;
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "echoframe-cli")]
#[command(about = "Command-line interface for the echoframe framed echo server")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7340", env = "ECHOFRAME_SERVER")]
    server: SocketAddr,

    /// Expect framed replies (server runs with reply_mode: framed)
    #[arg(long)]
    framed_replies: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a payload and print its echo
    Send {
        /// Payload text (reads stdin when omitted)
        message: Option<String>,
    },

    /// Check that the server answers a probe frame
    Probe,

    /// Send sequential frames and report round-trip throughput
    Bench {
        /// Number of frames
        #[arg(short = 'n', long, default_value_t = 1000)]
        count: u64,

        /// Payload size in bytes
        #[arg(short = 's', long, default_value_t = 64)]
        size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let reply_mode = if cli.framed_replies {
        ReplyMode::Framed
    } else {
        ReplyMode::Raw
    };
    let config = ConnectionConfig::new(cli.server)
        .with_request_timeout(Duration::from_secs(cli.timeout))
        .with_reply_mode(reply_mode);

    let mut client = Client::connect_with_config(config).await?;

    match cli.command {
        Commands::Send { message } => {
            let payload = match message {
                Some(text) => text.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };

            let reply = client.echo(&payload).await?;
            std::io::Write::write_all(&mut std::io::stdout(), &reply)?;
        }

        Commands::Probe => {
            client.ping().await?;
            println!("{} is up", cli.server);
        }

        Commands::Bench { count, size } => {
            let payload = vec![0x5au8; size];
            let started = Instant::now();

            for _ in 0..count {
                let reply = client.echo(&payload).await?;
                if reply.len() != payload.len() {
                    return Err("echo reply length mismatch".into());
                }
            }

            let elapsed = started.elapsed();
            let per_frame = elapsed / count.max(1) as u32;
            println!(
                "{} frames of {} bytes in {:.3}s ({:?}/frame)",
                count,
                size,
                elapsed.as_secs_f64(),
                per_frame
            );
        }
    }

    client.close().await?;
    Ok(())
}
