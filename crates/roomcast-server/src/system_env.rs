//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` backs the [`Environment`] trait with real system resources:
//! monotonic `std::time::Instant`, the system wall clock for message
//! timestamps, tokio's async sleep, and OS cryptographic randomness via
//! getrandom.
//!
//! Production behavior is therefore non-deterministic; tests substitute
//! their own `Environment` with pinned time and seeded randomness.

use std::time::Duration;

use roomcast_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// Panics if the OS RNG fails. This is intentional: session IDs and account
/// tokens come from this RNG, and a server without functioning cryptographic
/// randomness must not keep accepting connections. RNG failure indicates
/// OS-level problems and is extremely rare.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - server cannot operate securely");
    }

    #[allow(clippy::expect_used)]
    fn wall_clock_ms(&self) -> u64 {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        u64::try_from(elapsed.as_millis())
            .expect("invariant: milliseconds since epoch fit in u64 for hundreds of millennia")
    }
}
