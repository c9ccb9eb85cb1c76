//! Reusable per-query search state.
//!
//! A query touches a tiny fraction of a metropolitan dataset, so all
//! per-round state is sparse. A [`Rounds`] instance is expensive to
//! allocate but cheap to wipe: [`Rounds::new_session`] clears every map in
//! place, preserving capacity, so instances are reused across many
//! requests via [`RoundsPool`].

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use crate::model::Mode;
use crate::{RouteId, TimeMs, TripId, VertexId};

/// How a vertex was reached within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    /// Query seed.
    Origin,
    /// Carried forward from the previous round unchanged.
    NoChange,
    Walk,
    Cycle,
    Car,
    /// Reached by riding this trip.
    Transit(TripId),
}

impl LegKind {
    pub fn of_mode(mode: Mode) -> LegKind {
        match mode {
            Mode::Foot => LegKind::Walk,
            Mode::Bike => LegKind::Cycle,
            Mode::Car => LegKind::Car,
        }
    }

    pub fn street_mode(self) -> Option<Mode> {
        match self {
            LegKind::Walk => Some(Mode::Foot),
            LegKind::Cycle => Some(Mode::Bike),
            LegKind::Car => Some(Mode::Car),
            _ => None,
        }
    }
}

/// Label of one vertex in one round.
///
/// `enter_key` and `departure` are overloaded the same way for both label
/// families: for a street leg they hold the predecessor vertex and the
/// absolute time the movement started; for a transit leg they hold the
/// stop position within the trip's route and the day number the trip
/// departed on.
#[derive(Debug, Clone, Copy)]
pub struct StopArrival {
    /// Absolute arrival time in ms since the Unix epoch.
    pub arrival: TimeMs,
    pub leg: LegKind,
    pub enter_key: u64,
    pub departure: u64,
    /// Accumulated street time within the current transfer round, for the
    /// per-mode budget.
    pub transfer_time: u32,
    /// Bitmask of vehicles that reached this vertex in this round.
    pub vehicles: u8,
}

/// Mutable state of one query. Index `0` holds the origin seeds; scanners
/// invoked "at index i" read round `i` and write round `i + 1`.
#[derive(Debug)]
pub struct Rounds {
    pub rounds: Vec<HashMap<VertexId, StopArrival>>,
    /// Vertices improved in the current round, feeding the next transit
    /// scan.
    pub marked_stops: HashSet<VertexId>,
    /// Snapshot of the marked set taken right before a transfer round.
    pub marked_stops_for_transfer: HashSet<VertexId>,
    /// Best arrival ever seen per vertex, across all rounds.
    pub earliest_arrivals: HashMap<VertexId, TimeMs>,
    /// Per-route earliest boarding position, reused across transit scans.
    pub queue: HashMap<RouteId, u32>,
}

impl Rounds {
    /// Rounds required for `transfer_limit` transit legs: a seed round,
    /// a transit + transfer pair per leg, and one slot for the
    /// unrestricted fallback round.
    pub fn rounds_for_limit(transfer_limit: usize) -> usize {
        (transfer_limit + 1) * 2 + 2
    }

    pub fn new(transfer_limit: usize) -> Self {
        let count = Self::rounds_for_limit(transfer_limit);
        Rounds {
            rounds: (0..count).map(|_| HashMap::new()).collect(),
            marked_stops: HashSet::new(),
            marked_stops_for_transfer: HashSet::new(),
            earliest_arrivals: HashMap::new(),
            queue: HashMap::with_capacity(1024),
        }
    }

    /// Grows the round vector if a planner with a larger transfer limit
    /// borrows this instance.
    pub(crate) fn ensure_rounds(&mut self, count: usize) {
        while self.rounds.len() < count {
            self.rounds.push(HashMap::new());
        }
    }

    /// Wipes all state from the previous query in place. Amortized
    /// O(touched): capacity is kept, nothing is reallocated.
    pub fn new_session(&mut self) {
        self.rounds.par_iter_mut().for_each(|round| round.clear());
        self.marked_stops.clear();
        self.marked_stops_for_transfer.clear();
        self.earliest_arrivals.clear();
        self.queue.clear();
    }
}

/// A bounded pool of [`Rounds`] instances. Each request checks one out,
/// runs its query and returns it on drop; a fresh instance is created
/// when the pool runs dry, and surplus instances beyond the bound are
/// discarded instead of being kept.
#[derive(Debug)]
pub struct RoundsPool {
    slots: Mutex<Vec<Rounds>>,
    capacity: usize,
    transfer_limit: usize,
}

impl RoundsPool {
    pub fn new(capacity: usize, transfer_limit: usize) -> Self {
        RoundsPool {
            slots: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            transfer_limit,
        }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Vec<Rounds>> {
        // A pool with a poisoned lock is still usable; Rounds carries no
        // cross-query invariants once new_session runs.
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn checkout(&self) -> PooledRounds<'_> {
        let reused = self.slots().pop();
        let rounds = reused.unwrap_or_else(|| Rounds::new(self.transfer_limit));
        PooledRounds {
            rounds: Some(rounds),
            pool: self,
        }
    }
}

/// Guard around a checked-out [`Rounds`]; returns it to the pool on drop.
#[derive(Debug)]
pub struct PooledRounds<'a> {
    rounds: Option<Rounds>,
    pool: &'a RoundsPool,
}

impl Deref for PooledRounds<'_> {
    type Target = Rounds;

    fn deref(&self) -> &Rounds {
        self.rounds.as_ref().expect("rounds already returned")
    }
}

impl DerefMut for PooledRounds<'_> {
    fn deref_mut(&mut self) -> &mut Rounds {
        self.rounds.as_mut().expect("rounds already returned")
    }
}

impl Drop for PooledRounds<'_> {
    fn drop(&mut self) {
        if let Some(rounds) = self.rounds.take() {
            let mut slots = self.pool.slots();
            if slots.len() < self.pool.capacity {
                slots.push(rounds);
            }
        }
    }
}
