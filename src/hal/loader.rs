//! Program loader
//!
//! Stands in for the VFS open/read/close cycle plus the ELF interpreter.
//! Real kernels hand the address-space builder a sequence of (vaddr, size,
//! permissions) segments read off a binary; this trait captures exactly
//! that shape so C2's `as_prepare_load`/`as_complete_load` machinery has
//! something to drive without owning a filesystem.

use crate::error::KernelResult;

/// One loadable segment of a program image.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub vaddr: usize,
    pub size: usize,
    pub writable: bool,
}

/// A resolved program image: its segments plus the address execution
/// should begin at.
#[derive(Debug, Clone, Copy)]
pub struct LoadedProgram {
    pub text: Segment,
    pub data: Segment,
    pub entrypoint: usize,
}

/// Resolves a path to a loadable program. The real collaborator opens a
/// vnode and walks ELF program headers; this trait only needs to produce
/// the same two facts the rest of the core consumes.
pub trait ProgramLoader: Sync {
    fn load(&self, path: &str) -> KernelResult<LoadedProgram>;
}

/// A loader backed by a small fixed table of named programs, for tests and
/// for driving the core without a real filesystem underneath it.
pub struct StaticLoader {
    programs: &'static [(&'static str, LoadedProgram)],
}

impl StaticLoader {
    pub const fn new(programs: &'static [(&'static str, LoadedProgram)]) -> Self {
        Self { programs }
    }
}

impl ProgramLoader for StaticLoader {
    fn load(&self, path: &str) -> KernelResult<LoadedProgram> {
        self.programs
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, program)| *program)
            .ok_or(crate::error::KernelError::LoadFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAMS: &[(&str, LoadedProgram)] = &[(
        "/bin/hello",
        LoadedProgram {
            text: Segment { vaddr: 0x0040_0000, size: 0x1000, writable: false },
            data: Segment { vaddr: 0x0040_1000, size: 0x1000, writable: true },
            entrypoint: 0x0040_0000,
        },
    )];

    #[test]
    fn resolves_known_path() {
        let loader = StaticLoader::new(PROGRAMS);
        let program = loader.load("/bin/hello").unwrap();
        assert_eq!(program.entrypoint, 0x0040_0000);
    }

    #[test]
    fn unknown_path_fails() {
        let loader = StaticLoader::new(PROGRAMS);
        assert!(loader.load("/bin/nonexistent").is_err());
    }
}
