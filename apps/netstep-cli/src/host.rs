use netstep_kernel::{ArenaToken, DoubleRewindArena, ScopeHost, TimeWindow};

/// Scratch bytes available to each invocation.
const SCRATCH_BYTES: usize = 64 * 1024;

/// A scope host backed by a real double-buffered arena.
#[derive(Debug)]
pub struct SimHost {
    windows: Vec<TimeWindow>,
    arenas: DoubleRewindArena,
}

impl SimHost {
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
            arenas: DoubleRewindArena::with_capacity(SCRATCH_BYTES),
        }
    }

    /// The innermost pushed window.
    pub fn window(&self) -> Option<TimeWindow> {
        self.windows.last().copied()
    }

    /// Allocate per-invocation scratch space from the current scoped arena.
    pub fn scratch(&mut self, len: usize) -> Option<&mut [u8]> {
        self.arenas.current()?.alloc(len)
    }
}

impl ScopeHost for SimHost {
    fn push_time_window(&mut self, window: TimeWindow) {
        self.windows.push(window);
    }

    fn pop_time_window(&mut self) {
        self.windows.pop();
    }

    fn acquire_scoped_arena(&mut self) -> ArenaToken {
        self.arenas.acquire()
    }

    fn release_scoped_arena(&mut self, previous: ArenaToken) {
        self.arenas.release(previous);
    }
}
