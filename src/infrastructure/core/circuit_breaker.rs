use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Calls pass through
    Open,     // Calls rejected until the cooldown elapses
    HalfOpen, // One probe call allowed
}

/// Stops hammering an unreachable ledger node.
///
/// After `failure_threshold` consecutive failures the circuit opens and
/// every call fails fast for `cooldown`. The first call after the cooldown
/// is a probe: success closes the circuit, failure reopens it.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: usize,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

struct BreakerState {
    circuit: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState {
                circuit: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Run `f` unless the circuit is open
    pub async fn call<F, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        {
            let mut state = self.state.lock().await;
            if state.circuit == CircuitState::Open {
                let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or(self.cooldown);
                if elapsed < self.cooldown {
                    return Err(CircuitBreakerError::Open {
                        name: self.name.clone(),
                        retry_in: self.cooldown - elapsed,
                    });
                }
                info!("CircuitBreaker [{}]: Open -> HalfOpen (cooldown elapsed)", self.name);
                state.circuit = CircuitState::HalfOpen;
            }
        }

        match f.await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(e) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn on_success(&self) {
        let mut state = self.state.lock().await;
        if state.circuit != CircuitState::Closed {
            info!("CircuitBreaker [{}]: {:?} -> Closed", self.name, state.circuit);
        }
        state.circuit = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;

        match state.circuit {
            CircuitState::Closed if state.consecutive_failures >= self.failure_threshold => {
                error!(
                    "CircuitBreaker [{}]: Closed -> Open ({} consecutive failures)",
                    self.name, state.consecutive_failures
                );
                state.circuit = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                warn!("CircuitBreaker [{}]: HalfOpen -> Open (probe failed)", self.name);
                state.circuit = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.circuit
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("Circuit breaker [{name}] is open, retry in {retry_in:?}")]
    Open { name: String, retry_in: Duration },

    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_circuit_opens_after_failures() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(60));

        for _ in 0..3 {
            let result = cb.call(async { Err::<(), &str>("error") }).await;
            assert!(matches!(result, Err(CircuitBreakerError::Inner("error"))));
        }
        assert_eq!(cb.state().await, CircuitState::Open);

        let result = cb.call(async { Ok::<(), &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", 2, Duration::from_secs(60));

        let _ = cb.call(async { Err::<(), &str>("error") }).await;
        let _ = cb.call(async { Ok::<(), &str>(()) }).await;
        let _ = cb.call(async { Err::<(), &str>("error") }).await;

        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_probe_closes_or_reopens() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(50));

        let _ = cb.call(async { Err::<(), &str>("error") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let _ = cb.call(async { Err::<(), &str>("error") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let result = cb.call(async { Ok::<u8, &str>(7) }).await;
        assert!(matches!(result, Ok(7)));
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
