//! Per-room sequence tracking.
//!
//! Live deliveries and history replay can overlap after a reconnect. The
//! tracker accepts each `(room, sequence)` once and keeps a contiguous
//! watermark used as the `since` value when catching up.

use std::collections::{BTreeSet, HashMap};

/// Out-of-order sequences kept above the watermark before it is forced forward
const MAX_PENDING: usize = 1024;

#[derive(Debug, Default)]
struct RoomCursor {
    watermark: u64,
    ahead: BTreeSet<u64>,
}

impl RoomCursor {
    fn advance(&mut self) {
        while self.ahead.remove(&(self.watermark + 1)) {
            self.watermark += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    rooms: HashMap<String, RoomCursor>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a room at `sequence` unless it is already tracked
    pub fn start_at(&mut self, room: &str, sequence: u64) {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| RoomCursor {
                watermark: sequence,
                ahead: BTreeSet::new(),
            });
    }

    /// Record a delivery. Returns `false` for a sequence already seen.
    pub fn observe(&mut self, room: &str, sequence: u64) -> bool {
        let cursor = self.rooms.entry(room.to_string()).or_default();
        if sequence <= cursor.watermark || !cursor.ahead.insert(sequence) {
            return false;
        }
        cursor.advance();

        // a gap that history can no longer fill
        if cursor.ahead.len() > MAX_PENDING
            && let Some(&first) = cursor.ahead.first()
        {
            cursor.watermark = first - 1;
            cursor.advance();
        }
        true
    }

    /// Highest sequence below which nothing is missing
    pub fn last_seen(&self, room: &str) -> u64 {
        self.rooms.get(room).map_or(0, |cursor| cursor.watermark)
    }

    pub fn forget(&mut self, room: &str) {
        self.rooms.remove(room);
    }
}
