//! Bracket state machines shared by the drivers.
//!
//! A driver is asked "should you run?" repeatedly each frame until it answers
//! `false`. [`Bracket`] owns the enter/continue/exit bookkeeping so each
//! driver only supplies its [`BracketHooks`].

/// Which bracket shape a driver uses. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BracketMode {
    /// Run at most once per frame: enter, then exit on the next query.
    SingleShot,
    /// Enter once, keep running while `should_continue` holds, then exit.
    RepeatWhile,
}

/// The four hook points of a bracket plus its predicates.
pub trait BracketHooks<C: ?Sized> {
    /// Decide whether to enter the bracket this frame.
    fn should_enter(&mut self, cx: &mut C) -> bool;

    /// Prepare the first invocation.
    fn on_enter(&mut self, cx: &mut C);

    /// Keep-going predicate. Only consulted in [`BracketMode::RepeatWhile`].
    fn should_continue(&mut self, _cx: &mut C) -> bool {
        false
    }

    /// Prepare every invocation after the first.
    fn on_continue(&mut self, _cx: &mut C) {}

    /// Tear down after the last invocation.
    fn on_exit(&mut self, cx: &mut C);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BracketState {
    Idle,
    Active,
}

/// Statically dispatched enter/continue/exit state machine.
#[derive(Debug)]
pub struct Bracket<H> {
    mode: BracketMode,
    state: BracketState,
    hooks: H,
}

impl<H> Bracket<H> {
    pub fn new(mode: BracketMode, hooks: H) -> Self {
        Self {
            mode,
            state: BracketState::Idle,
            hooks,
        }
    }

    pub fn single_shot(hooks: H) -> Self {
        Self::new(BracketMode::SingleShot, hooks)
    }

    pub fn repeat_while(hooks: H) -> Self {
        Self::new(BracketMode::RepeatWhile, hooks)
    }

    pub fn mode(&self) -> BracketMode {
        self.mode
    }

    /// Whether an invocation is currently open.
    pub fn is_active(&self) -> bool {
        self.state == BracketState::Active
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Advance the state machine by one query.
    pub fn should_run<C: ?Sized>(&mut self, cx: &mut C) -> bool
    where
        H: BracketHooks<C>,
    {
        match self.state {
            BracketState::Idle => {
                if !self.hooks.should_enter(cx) {
                    return false;
                }
                self.hooks.on_enter(cx);
                self.state = BracketState::Active;
                true
            }
            BracketState::Active => {
                if self.mode == BracketMode::RepeatWhile && self.hooks.should_continue(cx) {
                    self.hooks.on_continue(cx);
                    return true;
                }
                self.hooks.on_exit(cx);
                self.state = BracketState::Idle;
                false
            }
        }
    }

    /// Query until the bracket declines, calling `body` once per invocation.
    /// Returns the number of invocations.
    pub fn run<C: ?Sized>(&mut self, cx: &mut C, mut body: impl FnMut(&mut C)) -> u32
    where
        H: BracketHooks<C>,
    {
        let mut invocations = 0;
        while self.should_run(cx) {
            body(cx);
            invocations += 1;
        }
        invocations
    }
}
