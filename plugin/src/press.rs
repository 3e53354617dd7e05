/// Short / double / long press classification for a single key.
///
/// The host only reports raw key-down and key-up events.  Two timers turn
/// them into gestures:
///   - a long-press timer armed on key-down; if it fires while the key is
///     still held, [`Gesture::Long`] is emitted right away;
///   - a short/double timer (re)armed on every key-up; when the window closes
///     the number of releases seen decides between [`Gesture::Short`] (1),
///     [`Gesture::Double`] (2) or nothing at all (3 or more).
///
/// Timers are tokio tasks.  Each one carries the epoch it was armed in and
/// does nothing if that epoch has moved on, so a timer that wakes up just as
/// it is being cancelled can never emit.
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Classified output of one press cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Short,
    Double,
    Long,
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gesture::Short => write!(f, "short"),
            Gesture::Double => write!(f, "double"),
            Gesture::Long => write!(f, "long"),
        }
    }
}

/// Where the classifier is in the current press cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Key is down and the long-press timer is armed.
    AwaitingLong,
    /// Key was released and the short/double window is open.
    ResolvingShortOrDouble,
}

#[derive(Default)]
struct PressState {
    phase: Phase,
    long_timer: Option<JoinHandle<()>>,
    long_epoch: u64,
    short_timer: Option<JoinHandle<()>>,
    short_epoch: u64,
    /// Set when the long timer fired; the next key-up only resets.
    long_fired: bool,
    /// Releases seen in the current short/double window.
    short_count: u32,
}

impl PressState {
    fn cancel_long(&mut self) {
        self.long_epoch += 1;
        if let Some(timer) = self.long_timer.take() {
            timer.abort();
        }
    }

    fn cancel_short(&mut self) {
        self.short_epoch += 1;
        if let Some(timer) = self.short_timer.take() {
            timer.abort();
        }
    }
}

/// Gesture classifier for one key instance.
pub struct PressClassifier {
    state: Arc<Mutex<PressState>>,
    gestures: mpsc::UnboundedSender<Gesture>,
}

impl PressClassifier {
    /// Creates an idle classifier that sends every gesture to `gestures`.
    pub fn new(gestures: mpsc::UnboundedSender<Gesture>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PressState::default())),
            gestures,
        }
    }

    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Handles a key-down.
    ///
    /// A pending short/double window is closed without resolving, but the
    /// release count is kept so that the following key-up can make it a
    /// double press.
    pub fn key_down(&self, long_threshold: Duration) {
        let mut state = self.state.lock();
        state.cancel_short();
        state.cancel_long();

        let epoch = state.long_epoch;
        let shared = Arc::clone(&self.state);
        let gestures = self.gestures.clone();
        state.long_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(long_threshold).await;
            {
                let mut state = shared.lock();
                if state.long_epoch != epoch {
                    trace!(epoch, "stale long-press timer ignored");
                    return;
                }
                state.long_timer = None;
                state.long_fired = true;
                state.phase = Phase::Idle;
            }
            emit(&gestures, Gesture::Long);
        }));
        state.phase = Phase::AwaitingLong;
    }

    /// Handles a key-up.
    pub fn key_up(&self, short_threshold: Duration) {
        let mut state = self.state.lock();
        state.cancel_long();

        if state.long_fired {
            // No short/double may follow a long press.
            state.long_fired = false;
            state.short_count = 0;
            state.phase = Phase::Idle;
            return;
        }

        state.short_count += 1;
        state.cancel_short();

        let epoch = state.short_epoch;
        let shared = Arc::clone(&self.state);
        let gestures = self.gestures.clone();
        state.short_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(short_threshold).await;
            let count = {
                let mut state = shared.lock();
                if state.short_epoch != epoch {
                    trace!(epoch, "stale short-press timer ignored");
                    return;
                }
                state.short_timer = None;
                state.phase = Phase::Idle;
                std::mem::take(&mut state.short_count)
            };
            match count {
                1 => emit(&gestures, Gesture::Short),
                2 => emit(&gestures, Gesture::Double),
                n => debug!(presses = n, "rapid multi-press discarded"),
            }
        }));
        state.phase = Phase::ResolvingShortOrDouble;
    }

    /// Cancels both timers and forgets the current cycle.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.cancel_long();
        state.cancel_short();
        state.long_fired = false;
        state.short_count = 0;
        state.phase = Phase::Idle;
    }
}

impl Drop for PressClassifier {
    fn drop(&mut self) {
        self.reset();
    }
}

fn emit(gestures: &mpsc::UnboundedSender<Gesture>, gesture: Gesture) {
    debug!(%gesture, "gesture classified");
    // The receiver only goes away while the key is being torn down.
    let _ = gestures.send(gesture);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    const SHORT: Duration = Duration::from_millis(200);
    const LONG: Duration = Duration::from_millis(500);

    fn classifier() -> (PressClassifier, mpsc::UnboundedReceiver<Gesture>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PressClassifier::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Gesture>) -> Vec<Gesture> {
        let mut out = Vec::new();
        while let Ok(g) = rx.try_recv() {
            out.push(g);
        }
        out
    }

    async fn tap(c: &PressClassifier, hold_ms: u64) {
        c.key_down(LONG);
        sleep(Duration::from_millis(hold_ms)).await;
        c.key_up(SHORT);
    }

    // ── single gestures ───────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn single_tap_is_short() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        assert_eq!(c.phase(), Phase::ResolvingShortOrDouble);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short]);
        assert_eq!(c.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn short_is_not_emitted_before_window_closes() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        sleep(Duration::from_millis(150)).await;
        assert!(drain(&mut rx).is_empty());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_quick_taps_are_double() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        sleep(Duration::from_millis(50)).await;
        tap(&c, 50).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Double]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_release_restarts_the_window() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        // Second press lands 180ms after the first release: still inside the window.
        sleep(Duration::from_millis(180)).await;
        tap(&c, 50).await;
        sleep(Duration::from_millis(150)).await;
        assert!(drain(&mut rx).is_empty(), "window must restart on the second release");

        sleep(Duration::from_millis(100)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Double]);
    }

    #[tokio::test(start_paused = true)]
    async fn taps_spaced_beyond_window_are_two_shorts() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        sleep(Duration::from_millis(300)).await;
        tap(&c, 50).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short, Gesture::Short]);
    }

    // ── long press ────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn hold_emits_long_before_release() {
        let (c, mut rx) = classifier();
        c.key_down(LONG);
        assert_eq!(c.phase(), Phase::AwaitingLong);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Long]);

        c.key_up(SHORT);
        sleep(Duration::from_millis(300)).await;
        assert!(drain(&mut rx).is_empty(), "no short/double after a long press");
        assert_eq!(c.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_long_presses_emit_one_long_each() {
        let (c, mut rx) = classifier();
        for _ in 0..3 {
            tap(&c, 700).await;
            sleep(Duration::from_millis(600)).await;
        }
        assert_eq!(drain(&mut rx), vec![Gesture::Long, Gesture::Long, Gesture::Long]);
    }

    #[tokio::test(start_paused = true)]
    async fn release_before_threshold_cancels_long() {
        let (c, mut rx) = classifier();
        tap(&c, 450).await;
        sleep(Duration::from_millis(1000)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short]);
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_after_tap_swallows_the_tap() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        sleep(Duration::from_millis(50)).await;
        tap(&c, 700).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Long]);
    }

    // ── discard policy ────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn three_quick_taps_emit_nothing() {
        let (c, mut rx) = classifier();
        for _ in 0..3 {
            tap(&c, 30).await;
            sleep(Duration::from_millis(30)).await;
        }
        sleep(Duration::from_millis(300)).await;
        assert!(drain(&mut rx).is_empty());

        // Counter was reset: the next tap is an ordinary short press.
        tap(&c, 30).await;
        sleep(Duration::from_millis(300)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short]);
    }

    // ── thresholds / reset ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn thresholds_come_from_each_call() {
        let (c, mut rx) = classifier();
        c.key_down(Duration::from_millis(100));
        sleep(Duration::from_millis(150)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Long]);
        c.key_up(Duration::from_millis(1000));

        c.key_down(Duration::from_millis(2000));
        sleep(Duration::from_millis(10)).await;
        c.key_up(Duration::from_millis(1000));
        sleep(Duration::from_millis(900)).await;
        assert!(drain(&mut rx).is_empty());
        sleep(Duration::from_millis(200)).await;
        assert_eq!(drain(&mut rx), vec![Gesture::Short]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_drops_pending_gestures() {
        let (c, mut rx) = classifier();
        tap(&c, 50).await;
        c.reset();
        sleep(Duration::from_millis(300)).await;
        assert!(drain(&mut rx).is_empty());
        assert_eq!(c.phase(), Phase::Idle);

        c.key_down(LONG);
        c.reset();
        sleep(Duration::from_millis(600)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
