use std::time::Duration;
use tokio::time::Instant;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const DELAY_CAP_SECS: u64 = 3600;

/// Per-block scheduling record held by the unconfirmed lane actor.
///
/// `last_attempted + delay` gates when the block may be handed out again;
/// the delay walks the Fibonacci series on every failure and snaps back to
/// one second once the block is done.
#[derive(Debug, Clone)]
pub(crate) struct BlockEntry {
    pub(crate) done: bool,
    pub(crate) last_attempted: Instant,
    pub(crate) delay: Duration,
}

impl BlockEntry {
    pub(crate) fn new() -> Self {
        Self {
            done: false,
            last_attempted: Instant::now(),
            delay: INITIAL_DELAY,
        }
    }

    /// Advances the delay to the next Fibonacci number, interpreted as seconds.
    pub(crate) fn advance_delay(&mut self) {
        self.delay = next_fibonacci_delay(self.delay);
    }

    pub(crate) fn reset_delay(&mut self) {
        self.delay = INITIAL_DELAY;
    }

    pub(crate) fn mark_attempted(&mut self) {
        self.last_attempted = Instant::now();
    }

    /// Whether the waiting phase has elapsed and the block may be attempted.
    pub(crate) fn can_attempt(&self) -> bool {
        self.last_attempted.elapsed() >= self.delay
    }
}

/// Multiplying a Fibonacci number by the golden ratio and rounding yields the
/// next number in the series. The modulo keeps any single wait under an hour.
pub(crate) fn next_fibonacci_delay(delay: Duration) -> Duration {
    let golden_ratio = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let next = (delay.as_secs_f64() * golden_ratio).round() as u64;
    Duration::from_secs(next % DELAY_CAP_SECS)
}
