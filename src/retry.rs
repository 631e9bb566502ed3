use std::time::Duration;

/// Caller-side retry policy for failed batch publishes.
///
/// The publisher never retries on its own; the agent loop consults this state
/// to decide whether to resend a batch or give up on it.
#[derive(Clone, Debug)]
pub struct RetryState {
    pub name: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub base_cooldown: Duration,
    pub current_cooldown: Duration,
}

impl RetryState {
    pub fn new(name: &str, max_attempts: u32, base_cooldown: Duration) -> Self {
        RetryState {
            name: name.to_string(),
            attempts: 0,
            max_attempts,
            base_cooldown,
            current_cooldown: base_cooldown,
        }
    }

    /// Record a failed attempt and return how long to wait before the next one
    pub fn record_failed_attempt(&mut self) -> Duration {
        self.attempts += 1;
        let wait = self.current_cooldown;

        // Exponential backoff: x1.5 per failure, capped at 30 seconds
        self.current_cooldown =
            Duration::from_secs_f64((self.current_cooldown.as_secs_f64() * 1.5).min(30.0));

        log::warn!(
            "{} attempt {}/{} failed, next retry in {:.1}s",
            self.name,
            self.attempts,
            self.max_attempts,
            wait.as_secs_f64()
        );
        wait
    }

    pub fn record_success(&mut self) {
        if self.attempts > 0 {
            log::info!("{} succeeded after {} failed attempt(s)", self.name, self.attempts);
        }
        self.reset();
    }

    /// Forget past failures, e.g. after giving up on a batch
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.current_cooldown = self.base_cooldown;
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn status(&self) -> String {
        if self.attempts == 0 {
            return format!("{}: OK", self.name);
        }
        if !self.can_retry() {
            return format!("{}: MAX_ATTEMPTS_EXCEEDED", self.name);
        }
        format!(
            "{}: RETRYING (attempt {}/{})",
            self.name, self.attempts, self.max_attempts
        )
    }
}
