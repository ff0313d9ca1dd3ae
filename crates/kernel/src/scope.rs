//! Scoped time windows and memory arenas around driver invocations.
//!
//! Every invocation runs inside a time window (what the simulation sees as
//! "elapsed" and "delta") and a scoped arena for per-invocation allocations.
//! Both are acquired together when an invocation starts and released in
//! reverse order when the next query arrives. The swap is a synchronization
//! point: the host must finish any work still using the outgoing arena.

use serde::{Deserialize, Serialize};

/// The time an invocation runs at.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    pub elapsed: f64,
    pub delta: f64,
}

impl TimeWindow {
    pub fn new(elapsed: f64, delta: f64) -> Self {
        Self { elapsed, delta }
    }
}

/// Opaque handle naming which arena was current before a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaToken(pub u32);

/// Hooks the owning world exposes to the drivers.
pub trait ScopeHost {
    fn push_time_window(&mut self, window: TimeWindow);

    fn pop_time_window(&mut self);

    /// Make a fresh scoped arena current, returning the one it replaces.
    fn acquire_scoped_arena(&mut self) -> ArenaToken;

    /// Make `previous` current again.
    fn release_scoped_arena(&mut self, previous: ArenaToken);

    /// Block until work bound to the current scoped arena has finished.
    fn complete_scoped_work(&mut self) {}
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("scope stack underflow: exit without a matching enter")]
    Underflow,
    #[error("{0} scope(s) still open at frame end")]
    Leaked(usize),
}

/// LIFO stack of open invocation scopes.
#[derive(Debug, Default)]
pub struct ArenaSwapper {
    saved: Vec<ArenaToken>,
}

impl ArenaSwapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    /// Push `window` and swap in a fresh scoped arena.
    pub fn enter<H: ScopeHost + ?Sized>(&mut self, host: &mut H, window: TimeWindow) {
        host.push_time_window(window);
        let previous = host.acquire_scoped_arena();
        self.saved.push(previous);
    }

    /// Close the innermost scope: restore its arena, then pop its window.
    pub fn exit<H: ScopeHost + ?Sized>(&mut self, host: &mut H) -> Result<(), ScopeError> {
        let previous = self.saved.pop().ok_or(ScopeError::Underflow)?;
        host.complete_scoped_work();
        host.release_scoped_arena(previous);
        host.pop_time_window();
        Ok(())
    }

    /// Error if any scope is still open.
    pub fn ensure_balanced(&self) -> Result<(), ScopeError> {
        match self.saved.len() {
            0 => Ok(()),
            n => Err(ScopeError::Leaked(n)),
        }
    }
}

/// A host that only records what it was asked to do. Useful for tooling and
/// tests that do not run real simulation work.
#[derive(Debug, Default)]
pub struct RecordingHost {
    windows: Vec<TimeWindow>,
    pushed: u32,
    popped: u32,
    next_arena: u32,
    current_arena: u32,
    completed_work: u32,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Window stack as currently pushed, innermost last.
    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    pub fn pushed(&self) -> u32 {
        self.pushed
    }

    pub fn popped(&self) -> u32 {
        self.popped
    }

    pub fn current_arena(&self) -> ArenaToken {
        ArenaToken(self.current_arena)
    }

    pub fn completed_work(&self) -> u32 {
        self.completed_work
    }
}

impl ScopeHost for RecordingHost {
    fn push_time_window(&mut self, window: TimeWindow) {
        self.windows.push(window);
        self.pushed += 1;
    }

    fn pop_time_window(&mut self) {
        self.windows.pop();
        self.popped += 1;
    }

    fn acquire_scoped_arena(&mut self) -> ArenaToken {
        self.next_arena += 1;
        std::mem::replace(&mut self.current_arena, self.next_arena).into()
    }

    fn release_scoped_arena(&mut self, previous: ArenaToken) {
        self.current_arena = previous.0;
    }

    fn complete_scoped_work(&mut self) {
        self.completed_work += 1;
    }
}

impl From<u32> for ArenaToken {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
