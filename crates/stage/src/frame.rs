use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    waiters: Mutex<Vec<Waker>>,
}

impl CancelState {
    fn waiters(&self) -> MutexGuard<'_, Vec<Waker>> {
        // A waker list stays usable after a panicking holder.
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared cancellation flag. Clones observe the same flag, and
/// [`CancelToken::cancelled`] lets a task wait for it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Release);
        let waiters = std::mem::take(&mut *self.0.waiters());
        for waker in waiters {
            waker.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the token is cancelled, from any thread.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled(self.clone())
    }
}

/// Future returned by [`CancelToken::cancelled`].
#[derive(Debug)]
pub struct Cancelled(CancelToken);

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.0.is_cancelled() {
            return Poll::Ready(());
        }
        {
            let mut waiters = self.0.0.waiters();
            if !waiters.iter().any(|w| w.will_wake(cx.waker())) {
                waiters.push(cx.waker().clone());
            }
        }
        // Cancel may have drained the list before we registered.
        if self.0.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// The per-frame task of a mount. Runs until cancelled on unmount.
#[derive(Debug, Clone, Default)]
pub struct FrameLoop {
    token: CancelToken,
    frames: u64,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Count a frame. Returns false once cancelled.
    pub fn tick(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.frames += 1;
        true
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        pollster::block_on(token.cancelled());
    }

    #[test]
    fn cancel_from_another_thread_wakes_waiter() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        pollster::block_on(token.cancelled());
        assert!(token.is_cancelled());
        canceller.join().unwrap();
    }

    #[test]
    fn cancelled_loop_stops_ticking() {
        let mut frames = FrameLoop::new();
        assert!(frames.tick());
        assert!(frames.tick());
        frames.token().cancel();
        assert!(!frames.is_running());
        assert!(!frames.tick());
        assert_eq!(frames.frames(), 2);
    }
}
