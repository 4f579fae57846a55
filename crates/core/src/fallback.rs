//! Ordered fallback across alternative strategies.
//!
//! Each [`Attempt`] wraps a lazily-started future; attempts run one at a
//! time in the order given and the first success wins. Futures of the
//! attempts after the winner are dropped without ever being polled.

use std::fmt;

use futures::future::BoxFuture;

/// One named strategy.
pub struct Attempt<'a, T> {
    name: &'static str,
    run: BoxFuture<'a, Result<T, String>>,
}

impl<'a, T> Attempt<'a, T> {
    /// Wrap a future producing `Result<T, E>`; the error is kept as its
    /// display string.
    pub fn new<F, E>(name: &'static str, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<T, E>> + Send + 'a,
        E: fmt::Display,
    {
        Self {
            name,
            run: Box::pin(async move { fut.await.map_err(|e| e.to_string()) }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// The winning attempt's value and how we got there.
#[derive(Debug)]
pub struct FallbackSuccess<T> {
    pub value: T,
    /// Name of the attempt that succeeded.
    pub method: &'static str,
    /// Failures of the attempts tried before it, in order.
    pub failures: Vec<AttemptFailure>,
}

/// A single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub method: &'static str,
    pub message: String,
}

/// Every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackError {
    pub failures: Vec<AttemptFailure>,
}

impl FallbackError {
    /// The failure of the last attempt tried.
    pub fn last_error(&self) -> Option<&AttemptFailure> {
        self.failures.last()
    }
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.last_error() {
            None => write!(f, "No methods were attempted"),
            Some(last) => {
                write!(
                    f,
                    "All {} methods failed. Last error ({}): {}",
                    self.failures.len(),
                    last.method,
                    last.message
                )?;
                let earlier = &self.failures[..self.failures.len() - 1];
                if !earlier.is_empty() {
                    write!(f, ". Earlier: ")?;
                    for (i, failure) in earlier.iter().enumerate() {
                        if i > 0 {
                            write!(f, "; ")?;
                        }
                        write!(f, "{}: {}", failure.method, failure.message)?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for FallbackError {}

/// Run `attempts` in order and return the first success.
pub async fn first_success<'a, T>(
    attempts: Vec<Attempt<'a, T>>,
) -> Result<FallbackSuccess<T>, FallbackError> {
    let mut failures = Vec::new();

    for attempt in attempts {
        tracing::info!(method = attempt.name, "Attempting");
        match attempt.run.await {
            Ok(value) => {
                tracing::info!(method = attempt.name, "Attempt succeeded");
                return Ok(FallbackSuccess {
                    value,
                    method: attempt.name,
                    failures,
                });
            }
            Err(message) => {
                tracing::warn!(method = attempt.name, error = %message, "Attempt failed");
                failures.push(AttemptFailure {
                    method: attempt.name,
                    message,
                });
            }
        }
    }

    Err(FallbackError { failures })
}
