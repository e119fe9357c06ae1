use std::time::Duration;

use anyhow::Context;
use derbyio::data::{DataReader, DataWriter};
use derbyproto::race::{read_server_event, split_roster, ServerEvent, ACCEPT_ACK};
use rand::Rng;
use tracing::{info, warn, Level};

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    bots: u32,
}

fn usage_and_exit() -> ! {
    eprintln!(
        "bot_rider\n\n\
USAGE:\n  bot_rider [--addr HOST:PORT] [--bots N]\n\n\
ENV:\n  DERBY_ADDR  default 127.0.0.1:5555\n  BOTS        default 4\n"
    );
    std::process::exit(2);
}

fn parse_args() -> Config {
    let mut addr = std::env::var("DERBY_ADDR").unwrap_or_else(|_| "127.0.0.1:5555".to_string());
    let mut bots: u32 = std::env::var("BOTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4)
        .max(1);

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--addr" => addr = it.next().unwrap_or_else(|| usage_and_exit()),
            "--bots" => {
                bots = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config { addr, bots }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bot_rider=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    info!(addr = %cfg.addr, bots = %cfg.bots, "bot riders starting");

    let mut bots = Vec::new();
    for i in 0..cfg.bots {
        let name = format!("Rider {}", i + 1);
        let addr = cfg.addr.clone();
        bots.push(tokio::spawn(async move {
            if let Err(e) = ride(&addr, &name).await {
                warn!(bot = %name, err = %e, "bot ended with error");
            }
        }));
        // Rider ids are handed out in arrival order; stagger the connects so
        // launch order and id order line up.
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    for bot in bots {
        let _ = bot.await;
    }
    Ok(())
}

async fn ride(addr: &str, name: &str) -> anyhow::Result<()> {
    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect {addr}"))?;
    let (rd, wr) = stream.into_split();
    let mut rd = DataReader::new(rd).max_str_len(1024);
    let mut wr = DataWriter::new(wr);

    wr.write_string(name).await?;
    wr.flush().await?;

    let ack = rd.read_string().await?.context("hung up before the ack")?;
    anyhow::ensure!(ack == ACCEPT_ACK, "unexpected handshake ack {ack:?}");

    let roster = rd
        .read_string()
        .await?
        .context("hung up before the roster")?;
    let riders = split_roster(&roster);
    info!(bot = %name, roster = %roster, "joined the race");

    loop {
        match read_server_event(&mut rd).await? {
            Some(ServerEvent::Turn) => {
                let roll: i32 = rand::rng().random_range(1..=6);
                info!(bot = %name, roll = %roll, "rolling");
                wr.write_i32(roll).await?;
                wr.flush().await?;
            }
            Some(ServerEvent::Progress(row)) => {
                info!(bot = %name, progress = ?row, "progress");
            }
            Some(ServerEvent::Ranks(ranks)) => {
                for (i, rank) in ranks.iter().enumerate() {
                    let rider = riders.get(i).map(String::as_str).unwrap_or("?");
                    info!(bot = %name, rider = %rider, rank = %rank, "podium");
                }
                return Ok(());
            }
            None => anyhow::bail!("server closed before the podium"),
        }
    }
}
