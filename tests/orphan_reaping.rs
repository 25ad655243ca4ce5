//! A parent exits while its child is still running. The child is orphaned,
//! not destroyed, since it hasn't exited yet; once it does exit, it
//! self-destroys immediately since its parent is already `PID_NULL`. The
//! table ends with zero records and the lowest pid is available again.

use proc_core::mm::AddressSpace;
use proc_core::process::{glue, pid};

#[test]
fn parent_exiting_first_leaves_child_to_self_destroy_on_its_own_exit() {
    let parent = glue::proc_create_runprogram("parent").unwrap();
    let child = glue::register_child(parent, "child", AddressSpace::create()).unwrap();

    pid::exit(parent, 0);
    assert!(pid::exists(child), "orphaned child is not destroyed until it exits");

    pid::exit(child, 7);
    assert!(!pid::exists(parent));
    assert!(!pid::exists(child));

    // The freed slots are available again; the next allocation reclaims
    // the lowest one, standing in for `next_available` rewinding.
    let reused = glue::proc_create_runprogram("next").unwrap();
    assert!(reused <= parent.max(child));
}
