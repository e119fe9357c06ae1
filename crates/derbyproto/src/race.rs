use derbyio::data::DataReader;
use derbyio::data::DataWriter;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;

use crate::ProtoError;

/// Fixed roster size. Progress and rank rows carry exactly this many values.
pub const RIDER_COUNT: usize = 4;

/// Server -> client: "you hold the turn, submit a move".
pub const CODE_TURN: i32 = -2;
/// Server -> client: opens the final-ranking row.
pub const CODE_RACE_OVER: i32 = -1;
/// Server -> client: closes a progress row, "race still in progress".
pub const CODE_RUNNING: i32 = 0;

/// Handshake acknowledgment, kept byte-for-byte as the clients expect it.
pub const ACCEPT_ACK: &str = "aceptado";

pub const MAX_NAME_LEN: usize = 64;

/// A rider name must survive the comma-joined roster message.
pub fn valid_rider_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= MAX_NAME_LEN && !name.contains(',')
}

pub fn join_roster<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().collect::<Vec<_>>().join(",")
}

pub fn split_roster(line: &str) -> Vec<String> {
    line.split(',').map(|s| s.to_string()).collect()
}

/// One decoded server burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// This rider holds the turn and may submit a move.
    Turn,
    /// Every rider's progress after a move, clamped to `[0, 100]`, id order.
    Progress([i32; RIDER_COUNT]),
    /// Final 1-based finish ranks, id order. The server closes after this.
    Ranks([i32; RIDER_COUNT]),
}

/// Decode one server burst by its leading integer.
///
/// Returns `Ok(None)` on clean EOF before any value arrived; a client that
/// has already consumed the ranks row treats that as a normal close.
pub async fn read_server_event<R: AsyncRead + Unpin>(
    rd: &mut DataReader<R>,
) -> std::io::Result<Option<ServerEvent>> {
    let Some(code) = rd.read_i32().await? else {
        return Ok(None);
    };

    match code {
        CODE_TURN => Ok(Some(ServerEvent::Turn)),
        CODE_RACE_OVER => Ok(Some(ServerEvent::Ranks(read_row(rd).await?))),
        v if v >= 0 => {
            let mut row = [0i32; RIDER_COUNT];
            row[0] = v;
            for slot in row.iter_mut().skip(1) {
                *slot = read_value(rd).await?;
            }
            let control = read_value(rd).await?;
            if control != CODE_RUNNING {
                return Err(proto_err(ProtoError::BadControl(control)));
            }
            Ok(Some(ServerEvent::Progress(row)))
        }
        v => Err(proto_err(ProtoError::UnknownCode(v))),
    }
}

/// Write the turn signal.
pub async fn write_turn_signal<W: AsyncWrite + Unpin>(
    wr: &mut DataWriter<W>,
) -> std::io::Result<()> {
    wr.write_i32(CODE_TURN).await
}

/// Write a progress row: every rider's progress, then the running trailer.
pub async fn write_progress<W: AsyncWrite + Unpin>(
    wr: &mut DataWriter<W>,
    progress: &[i32; RIDER_COUNT],
) -> std::io::Result<()> {
    for v in progress {
        wr.write_i32(*v).await?;
    }
    wr.write_i32(CODE_RUNNING).await
}

/// Write the end-of-race row: the race-over code, then every rider's rank.
pub async fn write_final_ranks<W: AsyncWrite + Unpin>(
    wr: &mut DataWriter<W>,
    ranks: &[i32; RIDER_COUNT],
) -> std::io::Result<()> {
    wr.write_i32(CODE_RACE_OVER).await?;
    for v in ranks {
        wr.write_i32(*v).await?;
    }
    Ok(())
}

async fn read_row<R: AsyncRead + Unpin>(
    rd: &mut DataReader<R>,
) -> std::io::Result<[i32; RIDER_COUNT]> {
    let mut row = [0i32; RIDER_COUNT];
    for slot in row.iter_mut() {
        *slot = read_value(rd).await?;
    }
    Ok(row)
}

// A burst must not be cut short once its leading value arrived.
async fn read_value<R: AsyncRead + Unpin>(rd: &mut DataReader<R>) -> std::io::Result<i32> {
    rd.read_i32()
        .await?
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof inside burst"))
}

fn proto_err(e: ProtoError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}
