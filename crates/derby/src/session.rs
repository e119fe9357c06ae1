use anyhow::Context;
use derbyio::data::DataReader;
use derbyio::data::DataWriter;
use derbyproto::race::{write_final_ranks, write_progress, write_turn_signal};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use crate::race::SharedRace;

/// Drive one rider's connection through the whole race.
///
/// Protocol order: roster once; then per turn a turn signal, the rider's
/// move in reply, a progress row, and the hand-off; after the race is over,
/// the final-ranking row. The session owns its connection exclusively; the
/// only shared resource it touches is the race state, and it only submits a
/// move while it holds the turn.
///
/// An IO error ends this session alone. If it strikes while this rider
/// holds the turn the race stalls, since the turn never leaves a rider that
/// cannot finish.
pub async fn run_rider_session<R, W>(
    id: usize,
    race: SharedRace,
    mut rd: DataReader<R>,
    mut wr: DataWriter<W>,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    wr.write_string(&race.roster_line()).await?;
    wr.flush().await?;

    while race.wait_turn(id).await {
        write_turn_signal(&mut wr).await?;
        wr.flush().await?;

        let roll = rd
            .read_i32()
            .await?
            .with_context(|| format!("rider {id} hung up before rolling"))?;

        let out = race.apply_move(id, roll);
        match out.finish_rank {
            Some(rank) => info!(rider = %id, rank = %rank, "rider finished"),
            None => info!(rider = %id, roll = %roll, progress = %out.progress, "rider advanced"),
        }

        // The snapshot is taken before the hand-off, so it reflects exactly
        // the state this rider's move produced.
        let progress = race.snapshot_progress();
        write_progress(&mut wr, &progress).await?;
        wr.flush().await?;

        race.advance_turn();
    }

    // Ranks are complete the instant the over flag flips; wait for the flag
    // unconditionally before reading them.
    race.wait_over().await;

    write_final_ranks(&mut wr, &race.snapshot_ranks()).await?;
    wr.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use derbyproto::race::{read_server_event, split_roster, ServerEvent, RIDER_COUNT};
    use tokio::io::{AsyncRead, AsyncWrite};

    fn names() -> Vec<String> {
        ["Ana", "Luis", "Marta", "Pau"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    struct RideReport {
        ranks: [i32; RIDER_COUNT],
        turns: usize,
        rows: usize,
    }

    async fn scripted_rider<R, W>(id: usize, rd: R, wr: W, roll: i32) -> RideReport
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut rd = DataReader::new(rd);
        let mut wr = DataWriter::new(wr);

        let roster = rd.read_string().await.unwrap().unwrap();
        assert_eq!(split_roster(&roster).len(), RIDER_COUNT);

        let mut turns: usize = 0;
        let mut rows = 0;
        loop {
            match read_server_event(&mut rd).await.unwrap() {
                Some(ServerEvent::Turn) => {
                    turns += 1;
                    wr.write_i32(roll).await.unwrap();
                    wr.flush().await.unwrap();
                }
                Some(ServerEvent::Progress(row)) => {
                    rows += 1;
                    // Each row a rider receives follows its own move, so its
                    // own lane must already reflect that move.
                    assert_eq!(row[id], (turns as i32 * roll).min(100));
                    assert!(row.iter().all(|p| (0..=100).contains(p)));
                }
                Some(ServerEvent::Ranks(ranks)) => {
                    return RideReport { ranks, turns, rows };
                }
                None => panic!("server closed before the ranks row"),
            }
        }
    }

    #[tokio::test]
    async fn full_race_over_duplex_pipes() {
        let race = SharedRace::new(names()).unwrap();

        let mut sessions = Vec::new();
        let mut riders = Vec::new();
        for id in 0..RIDER_COUNT {
            let (server_io, client_io) = tokio::io::duplex(1024);
            let (srd, swr) = tokio::io::split(server_io);
            let (crd, cwr) = tokio::io::split(client_io);

            let race = race.clone();
            sessions.push(tokio::spawn(run_rider_session(
                id,
                race,
                DataReader::new(srd),
                DataWriter::new(swr),
            )));
            riders.push(tokio::spawn(scripted_rider(id, crd, cwr, 6)));
        }

        for session in sessions {
            session.await.unwrap().unwrap();
        }
        for rider in riders {
            let report = rider.await.unwrap();
            // 6 * 16 = 96, so the 17th roll crosses the line for everyone.
            assert_eq!(report.turns, 17);
            assert_eq!(report.rows, 17);
            assert_eq!(report.ranks, [1, 2, 3, 4]);
        }
    }

    #[tokio::test]
    async fn uneven_strides_still_rank_everyone() {
        let race = SharedRace::new(names()).unwrap();

        let mut sessions = Vec::new();
        let mut riders = Vec::new();
        for id in 0..RIDER_COUNT {
            let (server_io, client_io) = tokio::io::duplex(1024);
            let (srd, swr) = tokio::io::split(server_io);
            let (crd, cwr) = tokio::io::split(client_io);

            let race = race.clone();
            sessions.push(tokio::spawn(run_rider_session(
                id,
                race,
                DataReader::new(srd),
                DataWriter::new(swr),
            )));
            // Different strides per rider; all still finish.
            riders.push(tokio::spawn(scripted_rider(id, crd, cwr, 4 + id as i32 % 3)));
        }

        for session in sessions {
            session.await.unwrap().unwrap();
        }
        let mut first_ranks = None;
        for rider in riders {
            let report = rider.await.unwrap();
            let mut sorted = report.ranks;
            sorted.sort_unstable();
            assert_eq!(sorted, [1, 2, 3, 4]);
            // Every rider sees the same final ranking.
            assert_eq!(*first_ranks.get_or_insert(report.ranks), report.ranks);
        }
    }

    #[tokio::test]
    async fn hangup_mid_turn_fails_only_that_session() {
        let race = SharedRace::new(names()).unwrap();

        let (server_io, client_io) = tokio::io::duplex(1024);
        let (srd, swr) = tokio::io::split(server_io);
        let session = tokio::spawn(run_rider_session(
            0,
            race.clone(),
            DataReader::new(srd),
            DataWriter::new(swr),
        ));

        // A bystander session for rider 1 keeps waiting for its turn.
        let (server_io2, _client_io2) = tokio::io::duplex(1024);
        let (srd2, swr2) = tokio::io::split(server_io2);
        let bystander = tokio::spawn(run_rider_session(
            1,
            race.clone(),
            DataReader::new(srd2),
            DataWriter::new(swr2),
        ));

        // Rider 0 reads its roster and turn signal, then hangs up.
        let (crd, cwr) = tokio::io::split(client_io);
        let mut rd = DataReader::new(crd);
        rd.read_string().await.unwrap().unwrap();
        assert_eq!(
            read_server_event(&mut rd).await.unwrap(),
            Some(ServerEvent::Turn)
        );
        drop(rd);
        drop(cwr);

        let err = session.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("hung up"));

        // The bystander is still blocked on its turn, not dead.
        assert!(!bystander.is_finished());
        bystander.abort();
    }
}
