use std::net::SocketAddr;

use anyhow::Context;
use derbyio::data::{DataReader, DataWriter};
use derbyproto::race::{valid_rider_name, ACCEPT_ACK, RIDER_COUNT};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};

mod race;
mod session;

use race::SharedRace;

type RiderReader = DataReader<OwnedReadHalf>;
type RiderWriter = DataWriter<OwnedWriteHalf>;

fn usage_and_exit() -> ! {
    eprintln!(
        "derby (race coordination server)\n\n\
USAGE:\n  derby [--bind HOST:PORT]\n\n\
ENV:\n  DERBY_BIND  default 0.0.0.0:5555\n"
    );
    std::process::exit(2);
}

#[derive(Clone, Debug)]
struct Config {
    bind: SocketAddr,
}

fn parse_args() -> Config {
    let mut bind: SocketAddr = std::env::var("DERBY_BIND")
        .unwrap_or_else(|_| "0.0.0.0:5555".to_string())
        .parse()
        .unwrap_or_else(|_| usage_and_exit());

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--bind" => {
                bind = it
                    .next()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(|| usage_and_exit())
            }
            "-h" | "--help" => usage_and_exit(),
            _ => usage_and_exit(),
        }
    }

    Config { bind }
}

/// Read the rider's name and acknowledge it.
///
/// Names must survive the comma-joined roster message, so an empty,
/// oversized, or comma-bearing name is a protocol violation and the
/// connection is dropped.
async fn handshake(rd: &mut RiderReader, wr: &mut RiderWriter) -> anyhow::Result<String> {
    let name = rd
        .read_string()
        .await?
        .context("hung up before sending a name")?;
    let name = name.trim().to_string();
    if !valid_rider_name(&name) {
        anyhow::bail!("unusable rider name {name:?}");
    }
    wr.write_string(ACCEPT_ACK).await?;
    wr.flush().await?;
    Ok(name)
}

/// Accept connections until the roster is full, then run the race to
/// completion and return the final ranks.
///
/// A failed handshake does not consume a roster slot; the listener keeps
/// accepting until exactly `RIDER_COUNT` riders are in. Rider ids are
/// assigned in arrival order.
async fn run_race(listener: &TcpListener) -> anyhow::Result<[i32; RIDER_COUNT]> {
    let mut names: Vec<String> = Vec::with_capacity(RIDER_COUNT);
    let mut conns: Vec<(RiderReader, RiderWriter)> = Vec::with_capacity(RIDER_COUNT);

    while conns.len() < RIDER_COUNT {
        let (stream, peer) = listener.accept().await?;
        let (rd, wr) = stream.into_split();
        let mut rd = DataReader::new(rd).max_str_len(256);
        let mut wr = DataWriter::new(wr);
        match handshake(&mut rd, &mut wr).await {
            Ok(name) => {
                info!(rider = %conns.len(), name = %name, peer = %peer, "rider accepted");
                names.push(name);
                conns.push((rd, wr));
            }
            Err(e) => {
                warn!(peer = %peer, err = %e, "handshake failed; slot stays open");
            }
        }
    }

    let race = SharedRace::new(names)?;
    info!(roster = %race.roster_line(), "roster complete; race starting");

    let mut riders = Vec::with_capacity(RIDER_COUNT);
    for (id, (rd, wr)) in conns.into_iter().enumerate() {
        let race = race.clone();
        riders.push(tokio::spawn(async move {
            if let Err(e) = session::run_rider_session(id, race, rd, wr).await {
                warn!(rider = %id, err = %e, "rider session ended with error");
            }
        }));
    }

    race.wait_over().await;

    // Every session still has its final-ranking row to flush; wait for them
    // before the caller tears the listener down.
    for rider in riders {
        let _ = rider.await;
    }

    Ok(race.snapshot_ranks())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,derby=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = parse_args();
    let listener = TcpListener::bind(cfg.bind).await?;
    info!(bind = %cfg.bind, riders = %RIDER_COUNT, "derby server listening");

    let ranks = run_race(&listener).await?;
    info!(ranks = ?ranks, "race finished; shutting down");
    Ok(())
}
