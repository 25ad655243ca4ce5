//! Intersection admission control
//!
//! Models a four-way intersection where, at any moment, only vehicles
//! travelling from one origin direction may be in the intersection at
//! once. A direction is admitted for a batch of at most [`MAX`] vehicles;
//! once every admitted vehicle has exited, the intersection is free for a
//! different direction to claim.
//!
//! `before_entry` blocks a denied caller on a condition variable rather
//! than spinning, and `after_exit` wakes every waiter once a batch fully
//! drains, mirroring the original's `cv_wait`/`cv_broadcast` pair.

use spin::Mutex;

use crate::config::INTERSECTION_MAX as MAX;
use crate::hal::sync::{Blocker, DefaultBlocker};

/// One of the four approaches to the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

struct State {
    current: Option<Direction>,
    enter_count: u32,
    exit_count: u32,
}

/// The intersection's admission state. One instance serializes every
/// vehicle's entry and exit.
pub struct Intersection {
    state: Mutex<State>,
    signal: DefaultBlocker,
}

impl Intersection {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(State { current: None, enter_count: 0, exit_count: 0 }),
            signal: DefaultBlocker::new(),
        }
    }

    /// Block until `origin` may enter, then admit it. `destination` plays
    /// no role in the admission decision; it is carried only because a
    /// caller needs it to know where to go once inside.
    pub fn before_entry(&self, origin: Direction, _destination: Direction) {
        loop {
            let mut state = self.state.lock();
            let occupied = state.enter_count != state.exit_count;
            let must_wait = occupied && (state.current != Some(origin) || state.enter_count >= MAX);
            if must_wait {
                drop(state);
                self.signal.wait();
                continue;
            }

            if !occupied && state.current != Some(origin) {
                state.enter_count = 0;
                state.exit_count = 0;
                state.current = Some(origin);
            }
            state.enter_count += 1;
            return;
        }
    }

    /// Record that a vehicle admitted from `origin` has left the
    /// intersection. When every admitted vehicle in the current batch has
    /// exited, the intersection drains, a new direction may claim it, and
    /// every waiter blocked in `before_entry` is woken to re-check.
    pub fn after_exit(&self, _origin: Direction, _destination: Direction) {
        let mut state = self.state.lock();
        state.exit_count += 1;
        let drained = state.exit_count == state.enter_count;
        drop(state);
        if drained {
            self.signal.notify_all();
        }
    }
}

impl Default for Intersection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Direction::*;

    #[test]
    fn second_direction_must_wait_while_first_occupies() {
        let isec = Intersection::new();
        isec.before_entry(North, South);
        let state = isec.state.lock();
        assert_eq!(state.current, Some(North));
        assert_eq!(state.enter_count, 1);
    }

    #[test]
    fn same_direction_can_stack_up_to_max() {
        let isec = Intersection::new();
        for _ in 0..MAX {
            isec.before_entry(East, West);
        }
        let state = isec.state.lock();
        assert_eq!(state.enter_count, MAX);
    }

    #[test]
    fn direction_rotates_once_batch_fully_exits() {
        let isec = Intersection::new();
        isec.before_entry(North, South);
        isec.before_entry(North, South);
        isec.after_exit(North, South);
        isec.after_exit(North, South);

        isec.before_entry(East, West);
        let state = isec.state.lock();
        assert_eq!(state.current, Some(East));
        assert_eq!(state.enter_count, 1);
    }

    #[test]
    fn partial_exit_does_not_drain_the_batch() {
        let isec = Intersection::new();
        isec.before_entry(North, South);
        isec.before_entry(North, South);
        isec.after_exit(North, South);

        let state = isec.state.lock();
        assert_eq!(state.enter_count, 2);
        assert_eq!(state.exit_count, 1);
    }
}
