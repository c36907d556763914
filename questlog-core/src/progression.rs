//! The progression engine: turns a task completion transition into a
//! deterministic experience/level mutation.
//!
//! Pure arithmetic over already-validated inputs; persistence is the
//! caller's job (`Database::update_task` runs this inside the same
//! transaction that flips the task's `completed` flag).

/// Experience awarded for each task completion.
pub const COMPLETION_REWARD: i64 = 10;

/// Experience required per level: `level * 100` to cross into the next.
pub const LEVEL_XP_STEP: i64 = 100;

/// Result of a completion that actually awarded experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub experience: i64,
    pub level: i64,
    pub leveled_up: bool,
}

/// Apply a completion transition to a user's progression counters.
///
/// Only a false→true transition mutates anything; true→true, false→false,
/// and true→false all return `None`. A returned `Some` doubles as the signal
/// that the task's `completed_at` must be stamped now.
///
/// The level check runs once, not in a loop: a single completion crosses at
/// most one level boundary, and the threshold just crossed is subtracted so
/// the remainder carries into the new level.
pub fn apply_completion(
    experience: i64,
    level: i64,
    was_completed: bool,
    will_be_completed: bool,
) -> Option<ProgressUpdate> {
    if was_completed || !will_be_completed {
        return None;
    }

    let mut experience = experience + COMPLETION_REWARD;
    let mut level = level;
    let mut leveled_up = false;

    if experience >= level * LEVEL_XP_STEP {
        level += 1;
        experience -= (level - 1) * LEVEL_XP_STEP;
        leveled_up = true;
    }

    Some(ProgressUpdate {
        experience,
        level,
        leveled_up,
    })
}
