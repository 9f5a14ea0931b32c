//! Canned listening-session generator
//!
//! Seeds an event log with sessions that exercise every transition kind, for
//! local development and demos. Not part of the aggregation pipeline.

use crate::graph::{Event, EventMeta, EventType, TrackId};
use crate::storage::{EventLog, StorageResult};
use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

/// Number of randomized filler sessions appended after the canned ones
const FILLER_SESSIONS: usize = 3;

/// Seed the log with deterministic-shape sessions over the given tracks.
///
/// Requires at least four tracks; missing ones are filled with generated ids.
/// Target graph from the canned sessions:
/// `a -> b -> c` (normal plus explicit radio transitions) and `a -> d -> b`
/// with `d` quickly skipped, producing a penalty on `d -> b`.
///
/// Returns the number of events written.
pub fn seed_sessions(log: &dyn EventLog, tracks: &[TrackId]) -> StorageResult<usize> {
    let mut tracks: Vec<TrackId> = tracks.to_vec();
    while tracks.len() < 4 {
        tracks.push(TrackId::from_string(Uuid::new_v4().to_string()));
    }
    let (a, b, c, d) = (&tracks[0], &tracks[1], &tracks[2], &tracks[3]);

    let mut written = 0;

    // Session 1: a -> b -> c, all wanted
    let session = new_session_id();
    for event in [
        Event::new(&session, a.clone(), EventType::PlayStart),
        Event::new(&session, a.clone(), EventType::Play10s),
        Event::new(&session, b.clone(), EventType::PlayStart),
        Event::new(&session, c.clone(), EventType::RadioNext),
    ] {
        log.append(&event)?;
        written += 1;
    }

    // Session 2: a -> d, d rejected quickly, then b
    let session = new_session_id();
    for event in [
        Event::new(&session, a.clone(), EventType::PlayStart),
        Event::new(&session, d.clone(), EventType::PlayStart),
        Event::new(&session, d.clone(), EventType::Skip)
            .with_meta(EventMeta::new().with("elapsed_ms", 2000)),
        Event::new(&session, b.clone(), EventType::PlayStart),
    ] {
        log.append(&event)?;
        written += 1;
    }

    // Filler: short random walks, no repeats back to back
    let mut rng = rand::thread_rng();
    for _ in 0..FILLER_SESSIONS {
        let session = new_session_id();
        let mut walk = tracks.clone();
        walk.shuffle(&mut rng);
        let hops = rng.gen_range(2..=walk.len());
        for track in walk.into_iter().take(hops) {
            log.append(&Event::new(&session, track, EventType::PlayStart))?;
            written += 1;
        }
    }

    Ok(written)
}

fn new_session_id() -> String {
    format!("sim-{}", Uuid::new_v4())
}
