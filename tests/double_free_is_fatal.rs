//! Freeing the same physical run twice is a programming error, not a
//! recoverable condition: it must abort rather than silently succeed or
//! return an error code.

use proc_core::hal::ram::StaticRam;
use proc_core::mm::FrameAllocator;

static RAM: StaticRam = StaticRam::new(0x2000, 0x2000 + 16 * 4096);

#[test]
#[should_panic(expected = "already-free")]
fn freeing_an_already_free_run_panics() {
    let allocator = FrameAllocator::new(&RAM);
    allocator.bootstrap();

    let paddr = allocator.alloc(1).unwrap();
    allocator.free(paddr);
    allocator.free(paddr);
}
