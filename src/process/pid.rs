//! PID registry
//!
//! Every process gets an entry here for the whole time anything might
//! still care about its exit status: from creation until either its
//! parent reaps it with [`wait`] or, if it was never going to be reaped
//! (its parent exited first), until the orphan cleanup in [`exit`] drops
//! it. A process whose parent never calls `wait` on it is a permanent
//! zombie entry — that is the documented behavior, not a bug.

use spin::Mutex;

use crate::config::{EXITCODE_NULL, PID_MAX, PID_MIN, PID_NULL};
use crate::error::{KernelError, KernelResult};
use crate::hal::sync::{Blocker, DefaultBlocker};

const TABLE_LEN: usize = (PID_MAX - PID_MIN + 1) as usize;

/// Signalled whenever any pid's exit status changes, so every blocked
/// `wait` call wakes up to re-check its own pid rather than needing one
/// condition variable per table slot.
static WAIT_SIGNAL: DefaultBlocker = DefaultBlocker::new();

#[derive(Debug, Clone, Copy)]
struct PidRecord {
    parent_pid: u32,
    exited: bool,
    exit_code: i32,
}

const EMPTY_SLOT: Option<PidRecord> = None;

struct PidTable {
    slots: [Option<PidRecord>; TABLE_LEN],
}

static TABLE: Mutex<PidTable> = Mutex::new(PidTable { slots: [EMPTY_SLOT; TABLE_LEN] });

fn slot_index(pid: u32) -> Option<usize> {
    if pid < PID_MIN || pid > PID_MAX {
        return None;
    }
    Some((pid - PID_MIN) as usize)
}

/// Allocate the first free pid and register it with the given parent.
/// `parent` is [`PID_NULL`] for the bootstrap/init process.
pub fn create(parent: u32) -> KernelResult<u32> {
    let mut table = TABLE.lock();
    for i in 0..TABLE_LEN {
        if table.slots[i].is_none() {
            table.slots[i] = Some(PidRecord { parent_pid: parent, exited: false, exit_code: EXITCODE_NULL });
            return Ok(PID_MIN + i as u32);
        }
    }
    Err(KernelError::OutOfMemory { requested: 1, available: 0 })
}

/// Record `pid`'s exit and propagate the consequences to its own children,
/// mirroring the two independent halves of the original exit path: the
/// exiting pid either gets its status recorded for a parent to reap, or is
/// destroyed immediately if it was already an orphan; separately, every
/// child it owned is orphaned, and any orphaned child that had already
/// exited is destroyed right there since nothing will ever reap it now.
pub fn exit(pid: u32, exit_code: i32) {
    let mut table = TABLE.lock();

    let index = slot_index(pid).expect("exit() called on a pid outside the table range");
    let already_orphaned = table.slots[index].map(|r| r.parent_pid == PID_NULL).unwrap_or(false);

    if already_orphaned {
        table.slots[index] = None;
    } else if let Some(record) = table.slots[index].as_mut() {
        record.exited = true;
        record.exit_code = exit_code;
    }

    for slot in table.slots.iter_mut() {
        if let Some(record) = slot {
            if record.parent_pid == pid {
                record.parent_pid = PID_NULL;
                if record.exited {
                    *slot = None;
                }
            }
        }
    }

    drop(table);
    WAIT_SIGNAL.notify_all();
}

/// Block until `pid` has exited, then reap its record and return its exit
/// code. Fails with `NotMyChild` if `pid` is not a live child of `caller`.
///
/// Blocks on [`WAIT_SIGNAL`] between polls rather than spinning; the
/// condition is still re-checked under the table lock on every wakeup,
/// since the signal is shared across every pid and a wakeup says nothing
/// about which pid actually exited.
pub fn wait(caller: u32, pid: u32) -> KernelResult<i32> {
    loop {
        let mut table = TABLE.lock();
        let index = slot_index(pid).ok_or(KernelError::ProcessNotFound { pid })?;
        let record = table.slots[index].ok_or(KernelError::ProcessNotFound { pid })?;
        if record.parent_pid != caller {
            return Err(KernelError::NotMyChild { pid });
        }
        if record.exited {
            let exit_code = record.exit_code;
            table.slots[index] = None;
            return Ok(exit_code);
        }
        drop(table);
        WAIT_SIGNAL.wait();
    }
}

/// True if `pid` has a live table entry, exited or not.
pub fn exists(pid: u32) -> bool {
    slot_index(pid)
        .and_then(|i| TABLE.lock().slots[i])
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_table() {
        let mut table = TABLE.lock();
        table.slots = [EMPTY_SLOT; TABLE_LEN];
    }

    #[test]
    fn exit_then_wait_returns_status_and_reaps() {
        reset_table();
        let parent = PID_MIN;
        table_insert_parent(parent);
        let child = create(parent).unwrap();

        exit(child, 7);
        assert!(exists(child));

        let status = wait(parent, child).unwrap();
        assert_eq!(status, 7);
        assert!(!exists(child));
    }

    #[test]
    fn wait_on_non_child_is_rejected() {
        reset_table();
        let parent = PID_MIN;
        table_insert_parent(parent);
        let other = PID_MIN + 1;
        table_insert_parent(other);
        let child = create(parent).unwrap();

        assert!(matches!(wait(other, child), Err(KernelError::NotMyChild { .. })));
    }

    #[test]
    fn exiting_parent_orphans_live_children() {
        reset_table();
        let parent = PID_MIN;
        table_insert_parent(parent);
        let child = create(parent).unwrap();

        exit(parent, 0);
        assert!(exists(child));
        let index = slot_index(child).unwrap();
        assert_eq!(TABLE.lock().slots[index].unwrap().parent_pid, PID_NULL);
    }

    #[test]
    fn orphaned_and_already_exited_child_is_destroyed_on_parent_exit() {
        reset_table();
        let parent = PID_MIN;
        table_insert_parent(parent);
        let child = create(parent).unwrap();
        exit(child, 3);
        assert!(exists(child));

        exit(parent, 0);
        assert!(!exists(child));
    }

    #[test]
    fn exit_of_an_already_orphaned_pid_destroys_it_immediately() {
        reset_table();
        let mut table = TABLE.lock();
        let index = slot_index(PID_MIN).unwrap();
        table.slots[index] = Some(PidRecord { parent_pid: PID_NULL, exited: false, exit_code: EXITCODE_NULL });
        drop(table);

        exit(PID_MIN, 5);
        assert!(!exists(PID_MIN));
    }

    fn table_insert_parent(pid: u32) {
        let mut table = TABLE.lock();
        let index = slot_index(pid).unwrap();
        table.slots[index] = Some(PidRecord { parent_pid: PID_NULL, exited: false, exit_code: EXITCODE_NULL });
    }
}
