//! Exec end-to-end: `execv` tears down the caller's old program image,
//! installs a new one, and marshals argv onto the new image's stack so the
//! program starting up can read its own arguments straight off it.

use proc_core::hal::loader::{LoadedProgram, Segment, StaticLoader};
use proc_core::hal::ram::StaticRam;
use proc_core::hal::tlb::{FaultType, Tlb};
use proc_core::mm::frame_allocator::FRAME_SIZE;
use proc_core::mm::{AddressSpace, FrameAllocator};
use proc_core::process::glue;
use proc_core::syscall::process::sys_execv;

static RAM: StaticRam = StaticRam::new(0x1000, 0x1000 + 256 * FRAME_SIZE);

const PROGRAMS: &[(&str, LoadedProgram)] = &[(
    "/prog",
    LoadedProgram {
        text: Segment { vaddr: 0x0040_0000, size: FRAME_SIZE, writable: false },
        data: Segment { vaddr: 0x0040_1000, size: FRAME_SIZE, writable: true },
        entrypoint: 0x0040_0000,
    },
)];

#[test]
fn execv_tears_down_old_image_and_marshals_argv() {
    let allocator = FrameAllocator::new(&RAM);
    allocator.bootstrap();
    let tlb = Tlb::new();
    let loader = StaticLoader::new(PROGRAMS);

    glue::proc_create_runprogram("shell").unwrap();

    let mut old_as = AddressSpace::create();
    old_as.define_region(0x0060_0000, FRAME_SIZE, false).unwrap();
    old_as.prepare_load(&allocator).unwrap();
    let free_before_exec = allocator.free_count();
    glue::curproc_setas(Some(old_as));

    let argv = ["prog", "a", "bb", "ccc"];
    let image = sys_execv("/prog", &argv, &allocator, &loader, &tlb).unwrap();
    assert_eq!(image.entry, 0x0040_0000);
    assert_eq!(image.argc, argv.len());
    assert_eq!(image.argv, image.stackptr);

    let new_as = glue::curproc_getas().unwrap();
    assert!(new_as.handle_fault(0x0040_0000, FaultType::Read, &tlb).is_ok());

    // The old image's frames (1 text page + 12 stack pages) came back; the
    // new image claimed its own (1 text + 1 data + 12 stack), a net loss of
    // one frame since the new image also has a data segment the old one
    // didn't.
    assert_eq!(allocator.free_count(), free_before_exec - 1);

    // Read the marshalled argv array back off the stack and follow each
    // pointer to confirm every string round-trips exactly, in order, and
    // that the array itself is NULL-terminated.
    let mut array_buf = vec![0u8; (argv.len() + 1) * 4];
    new_as.read_stack_bytes(image.argv, &mut array_buf, &allocator).unwrap();

    for (i, expected) in argv.iter().enumerate() {
        let word = u32::from_ne_bytes(array_buf[i * 4..i * 4 + 4].try_into().unwrap());
        let mut str_buf = vec![0u8; expected.len() + 1];
        new_as.read_stack_bytes(word as usize, &mut str_buf, &allocator).unwrap();
        assert_eq!(&str_buf[..expected.len()], expected.as_bytes());
        assert_eq!(str_buf[expected.len()], 0, "argument string must be NUL-terminated");
    }
    let terminator = u32::from_ne_bytes(array_buf[argv.len() * 4..(argv.len() + 1) * 4].try_into().unwrap());
    assert_eq!(terminator, 0, "argv array must be NULL-terminated");
}
