use std::sync::Arc;

use derbyproto::race::RIDER_COUNT;
use tokio::sync::watch;

/// Progress value at which a rider has finished.
pub const FINISH_LINE: i32 = 100;

#[derive(Debug, Clone)]
pub struct Rider {
    pub name: String,
    pub progress: i32,
    pub finish_rank: Option<i32>,
}

/// What one applied move did, captured atomically with the move itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    pub progress: i32,
    /// Set only when this move carried the rider across the finish line.
    pub finish_rank: Option<i32>,
    pub race_over: bool,
}

#[derive(Debug, Clone)]
pub struct RaceState {
    riders: Vec<Rider>,
    current_turn: usize,
    finished_count: usize,
    next_rank: i32,
    race_over: bool,
}

impl RaceState {
    pub fn new(names: Vec<String>) -> anyhow::Result<Self> {
        anyhow::ensure!(
            names.len() == RIDER_COUNT,
            "expected {RIDER_COUNT} rider names, got {}",
            names.len()
        );
        Ok(Self {
            riders: names
                .into_iter()
                .map(|name| Rider {
                    name,
                    progress: 0,
                    finish_rank: None,
                })
                .collect(),
            current_turn: 0,
            finished_count: 0,
            next_rank: 1,
            race_over: false,
        })
    }

    /// Apply the turn holder's move.
    ///
    /// A rider that already finished never advances again. The wire carries
    /// any `i32`; progress monotonicity is enforced here, so a negative
    /// submission does not rewind.
    pub fn apply_move(&mut self, id: usize, amount: i32) -> MoveOutcome {
        if self.riders[id].finish_rank.is_some() {
            return MoveOutcome {
                progress: self.riders[id].progress,
                finish_rank: None,
                race_over: self.race_over,
            };
        }

        let progress = self.riders[id]
            .progress
            .saturating_add(amount.max(0))
            .min(FINISH_LINE);
        self.riders[id].progress = progress;

        let mut finish_rank = None;
        if progress == FINISH_LINE {
            finish_rank = Some(self.next_rank);
            self.riders[id].finish_rank = finish_rank;
            self.next_rank += 1;
            self.finished_count += 1;
            if self.finished_count == self.riders.len() {
                self.race_over = true;
            }
        }

        MoveOutcome {
            progress,
            finish_rank,
            race_over: self.race_over,
        }
    }

    /// Hand the turn to the next unfinished rider, scanning at most N-1
    /// steps forward. When nobody else is unfinished the turn stays put.
    pub fn advance_turn(&mut self) {
        if self.race_over {
            return;
        }
        for step in 1..self.riders.len() {
            let id = (self.current_turn + step) % self.riders.len();
            if self.riders[id].finish_rank.is_none() {
                self.current_turn = id;
                return;
            }
        }
    }

    pub fn snapshot_progress(&self) -> [i32; RIDER_COUNT] {
        let mut out = [0i32; RIDER_COUNT];
        for (slot, rider) in out.iter_mut().zip(&self.riders) {
            *slot = rider.progress;
        }
        out
    }

    /// Final 1-based ranks, `0` for a rider that has not finished yet.
    /// Complete only once the race is over.
    pub fn snapshot_ranks(&self) -> [i32; RIDER_COUNT] {
        let mut out = [0i32; RIDER_COUNT];
        for (slot, rider) in out.iter_mut().zip(&self.riders) {
            *slot = rider.finish_rank.unwrap_or(0);
        }
        out
    }

    pub fn is_over(&self) -> bool {
        self.race_over
    }

    pub fn turn_holder(&self) -> usize {
        self.current_turn
    }

    /// All rider names in id order, joined the way the roster message wants.
    pub fn roster_line(&self) -> String {
        derbyproto::race::join_roster(self.riders.iter().map(|r| r.name.as_str()))
    }
}

/// The single synchronization boundary around [`RaceState`].
///
/// The state lives inside a `watch` channel: `send_modify` serializes every
/// mutation and wakes every waiter. A hand-off must wake everyone, since
/// which session may proceed next is a property of the state, not of any
/// particular waiter.
#[derive(Clone)]
pub struct SharedRace {
    tx: Arc<watch::Sender<RaceState>>,
}

impl SharedRace {
    pub fn new(names: Vec<String>) -> anyhow::Result<Self> {
        let state = RaceState::new(names)?;
        let (tx, _rx) = watch::channel(state);
        Ok(Self { tx: Arc::new(tx) })
    }

    pub fn apply_move(&self, id: usize, amount: i32) -> MoveOutcome {
        let mut out = MoveOutcome::default();
        self.tx.send_modify(|s| out = s.apply_move(id, amount));
        out
    }

    pub fn advance_turn(&self) {
        self.tx.send_modify(|s| s.advance_turn());
    }

    /// Suspend until this rider holds the turn, or the race is over.
    ///
    /// Returns `false` once the race is over. The watch version is marked
    /// seen before the predicate runs, so a hand-off landing between the
    /// check and the await cannot be missed.
    pub async fn wait_turn(&self, id: usize) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let s = rx.borrow_and_update();
                if s.is_over() {
                    return false;
                }
                if s.turn_holder() == id {
                    return true;
                }
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    /// Suspend until the race is over.
    pub async fn wait_over(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if rx.borrow_and_update().is_over() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn snapshot_progress(&self) -> [i32; RIDER_COUNT] {
        self.tx.borrow().snapshot_progress()
    }

    pub fn snapshot_ranks(&self) -> [i32; RIDER_COUNT] {
        self.tx.borrow().snapshot_ranks()
    }

    pub fn roster_line(&self) -> String {
        self.tx.borrow().roster_line()
    }
}
