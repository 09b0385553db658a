//! IdleTimer: deferred release of a device nobody is using.
//!
//! Every handle bound to a session holds an [`IdleToken`].  While at least one
//! token is alive the timer is suspended.  When the last token is dropped a
//! countdown starts; if no new token is acquired before it elapses, the
//! timer's callback runs and, once it is delivered, the timer is spent.
//!
//! ```text
//!   acquire()          drop(token)            timeout elapsed
//! ─────────●──────────────────●─────────────────────────●──► on_idle()
//!          └── countdown cancelled   └── countdown started
//! ```
//!
//! [`IdleTimer::release`] retires the timer without running the callback (used
//! when the session is being closed on purpose), while [`IdleTimer::expire`]
//! retires it and runs the callback immediately (used when the device went
//! away on its own).  Both are idempotent.
//!
//! The callback reports whether it delivered its notification.  When it did
//! not (the request inbox was full), the timer stays alive and counts down a
//! full window again, so an idle device is never stranded.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Inactivity window after which an unbound session asks to be closed.
pub const IDLE_RELEASE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Runs when the window elapses.  Returns `false` if the idle notification
/// could not be delivered, in which case the countdown starts over.
type IdleCallback = Box<dyn Fn() -> bool + Send + Sync>;

struct Shared {
    timeout: Duration,
    runtime: Handle,
    on_idle: IdleCallback,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    tokens: usize,
    /// No tokens are handed out and no countdown runs.
    released: bool,
    /// Set by `release`.  An undelivered notification never revives a
    /// retired timer.
    retired: bool,
    /// Bumped whenever a countdown is started or cancelled so a stale
    /// countdown that already woke up cannot fire.
    generation: u64,
    countdown: Option<JoinHandle<()>>,
}

impl TimerState {
    fn cancel_countdown(&mut self) {
        self.generation += 1;
        if let Some(countdown) = self.countdown.take() {
            countdown.abort();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        crate::lock(&self.state)
    }

    fn start_countdown(self: &Arc<Self>, state: &mut TimerState) {
        state.cancel_countdown();
        let generation = state.generation;
        let timeout = self.timeout;
        let shared = Arc::downgrade(self);
        state.countdown = Some(self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.fire_if_current(generation);
            }
        }));
    }

    fn fire_if_current(self: &Arc<Self>, generation: u64) {
        {
            let mut state = self.lock();
            if state.released || state.tokens > 0 || state.generation != generation {
                return;
            }
            state.released = true;
            state.countdown = None;
        }
        self.notify();
    }

    /// Runs the callback of a timer that was just marked released.  If the
    /// notification is not delivered the timer is revived and counts down
    /// again, unless it was retired meanwhile.
    fn notify(self: &Arc<Self>) {
        if (self.on_idle)() {
            return;
        }
        let mut state = self.lock();
        if state.retired {
            return;
        }
        state.released = false;
        self.start_countdown(&mut state);
    }
}

/// Cancellable countdown that runs a callback once a session has been idle
/// for a fixed window.
///
/// Cloning an `IdleTimer` yields another handle to the same timer.
#[derive(Clone)]
pub struct IdleTimer {
    shared: Arc<Shared>,
}

impl IdleTimer {
    /// Creates an idle timer.  No countdown runs until [`arm`](Self::arm) is
    /// called or the last token is dropped.
    ///
    /// `on_idle` returns whether its notification was delivered; `false`
    /// keeps the timer alive and retries after another full window.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(timeout: Duration, on_idle: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                timeout,
                runtime: Handle::current(),
                on_idle: Box::new(on_idle),
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Starts the countdown if no token is currently held.
    pub fn arm(&self) {
        let mut state = self.shared.lock();
        if state.tokens == 0 && !state.released {
            self.shared.start_countdown(&mut state);
        }
    }

    /// Acquires a token, suspending the countdown while it is held.
    ///
    /// Returns `None` once the timer has been released or has fired.
    pub fn acquire(&self) -> Option<IdleToken> {
        let mut state = self.shared.lock();
        if state.released {
            return None;
        }
        state.tokens += 1;
        state.cancel_countdown();
        Some(IdleToken {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Retires the timer for good without running the callback.
    ///
    /// Returns `true` only if the timer was still live.
    pub fn release(&self) -> bool {
        let mut state = self.shared.lock();
        state.retired = true;
        if state.released {
            return false;
        }
        state.released = true;
        state.cancel_countdown();
        true
    }

    /// Marks the timer released and runs the callback immediately, unless it
    /// was already released.  An undelivered notification is retried after a
    /// full window.
    pub fn expire(&self) -> bool {
        {
            let mut state = self.shared.lock();
            if state.released {
                return false;
            }
            state.released = true;
            state.cancel_countdown();
        }
        self.shared.notify();
        true
    }

    /// Returns `true` while the timer is released, expired, or fired.
    pub fn is_released(&self) -> bool {
        self.shared.lock().released
    }

    /// Number of tokens currently held.
    pub fn held_tokens(&self) -> usize {
        self.shared.lock().tokens
    }
}

/// Proof that a handle is bound to a session.  Dropping the last token starts
/// the idle countdown.
pub struct IdleToken {
    shared: Arc<Shared>,
}

impl Drop for IdleToken {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.tokens = state.tokens.saturating_sub(1);
        if state.tokens == 0 && !state.released {
            self.shared.start_countdown(&mut state);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
