//! Double-buffered rewindable arenas for per-invocation scratch memory.
//!
//! Each acquire flips to the other buffer and rewinds it, so allocations from
//! the previous invocation stay readable until the one after next. Hosts embed
//! [`DoubleRewindArena`] and forward the arena half of
//! [`ScopeHost`](crate::scope::ScopeHost) to it.

use crate::scope::ArenaToken;

/// Token value meaning "no scoped arena; the world allocator is current".
pub const WORLD_ARENA: ArenaToken = ArenaToken(0);

/// A bump allocator over a fixed buffer that is reset wholesale.
#[derive(Debug)]
pub struct RewindArena {
    buf: Vec<u8>,
    used: usize,
    rewinds: u64,
}

impl RewindArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            used: 0,
            rewinds: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// How many times this arena has been rewound.
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }

    /// Bump-allocate `len` zeroed bytes, or `None` if the arena is full.
    pub fn alloc(&mut self, len: usize) -> Option<&mut [u8]> {
        let start = self.used;
        let end = start.checked_add(len)?;
        if end > self.buf.len() {
            return None;
        }
        self.used = end;
        let slice = &mut self.buf[start..end];
        slice.fill(0);
        Some(slice)
    }

    /// Release every allocation at once.
    pub fn rewind(&mut self) {
        self.used = 0;
        self.rewinds += 1;
    }
}

/// Two [`RewindArena`]s used alternately by consecutive invocations.
#[derive(Debug)]
pub struct DoubleRewindArena {
    arenas: [RewindArena; 2],
    flip: usize,
    current: ArenaToken,
}

impl DoubleRewindArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arenas: [
                RewindArena::with_capacity(capacity),
                RewindArena::with_capacity(capacity),
            ],
            flip: 1,
            current: WORLD_ARENA,
        }
    }

    /// Flip to the other buffer, rewind it and make it current.
    pub fn acquire(&mut self) -> ArenaToken {
        self.flip ^= 1;
        self.arenas[self.flip].rewind();
        std::mem::replace(&mut self.current, Self::token(self.flip))
    }

    pub fn release(&mut self, previous: ArenaToken) {
        self.current = previous;
    }

    pub fn current_token(&self) -> ArenaToken {
        self.current
    }

    /// The current scoped arena, if one is active.
    pub fn current(&mut self) -> Option<&mut RewindArena> {
        match self.current.0 {
            0 => None,
            slot => self.arenas.get_mut(slot as usize - 1),
        }
    }

    pub fn arena(&self, slot: usize) -> &RewindArena {
        &self.arenas[slot]
    }

    fn token(slot: usize) -> ArenaToken {
        ArenaToken(slot as u32 + 1)
    }
}
