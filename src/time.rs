//! Time and delay functions
//!
//! The driver core does not own a hardware timer. The platform supplies a
//! free-running microsecond counter through [`Clock`], and every polling loop
//! and debounce wait in the crate is built on top of it.

/// Free-running monotonic microsecond counter supplied by the platform
pub trait Clock: Sync {
    /// Current time in microseconds. Must never go backwards.
    fn now_us(&self) -> u64;

    /// Current time in milliseconds
    #[inline]
    fn now_ms(&self) -> u64 {
        self.now_us() / 1000
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    #[inline]
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Spin-wait for approximately `us` microseconds
#[inline]
pub fn delay_us<C: Clock + ?Sized>(clock: &C, us: u64) {
    let start = clock.now_us();
    while clock.now_us().wrapping_sub(start) < us {
        core::hint::spin_loop();
    }
}

/// Spin-wait for approximately `ms` milliseconds
#[inline]
pub fn delay_ms<C: Clock + ?Sized>(clock: &C, ms: u64) {
    delay_us(clock, ms * 1000);
}

/// A deadline-based timeout for polling loops
///
/// # Example
///
/// ```ignore
/// let timeout = Timeout::from_ms(&clock, 100);
/// while !timeout.is_expired() {
///     if check_condition() {
///         return Ok(());
///     }
///     core::hint::spin_loop();
/// }
/// Err(UsbError::Timeout)
/// ```
pub struct Timeout<'a, C: Clock + ?Sized> {
    clock: &'a C,
    deadline: u64,
}

impl<'a, C: Clock + ?Sized> Timeout<'a, C> {
    /// Create a timeout that expires after `us` microseconds
    #[inline]
    pub fn from_us(clock: &'a C, us: u64) -> Self {
        Self {
            clock,
            deadline: clock.now_us().saturating_add(us),
        }
    }

    /// Create a timeout that expires after `ms` milliseconds
    #[inline]
    pub fn from_ms(clock: &'a C, ms: u64) -> Self {
        Self::from_us(clock, ms.saturating_mul(1000))
    }

    /// Check whether the deadline has passed
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.clock.now_us() >= self.deadline
    }

    /// Microseconds left before expiry (0 once expired)
    #[inline]
    pub fn remaining_us(&self) -> u64 {
        self.deadline.saturating_sub(self.clock.now_us())
    }
}

/// Clock for tests: time only moves when told to, plus an optional fixed
/// step on every read so that busy-wait loops terminate.
#[cfg(test)]
pub struct TestClock {
    now_us: core::sync::atomic::AtomicU64,
    step_us: u64,
}

#[cfg(test)]
impl TestClock {
    /// Clock that advances `step_us` on every read
    pub fn stepping(step_us: u64) -> Self {
        Self {
            now_us: core::sync::atomic::AtomicU64::new(0),
            step_us,
        }
    }

    /// Clock that only moves through [`TestClock::advance_ms`]
    pub fn frozen() -> Self {
        Self::stepping(0)
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_us
            .fetch_add(ms * 1000, core::sync::atomic::Ordering::SeqCst);
    }

    /// Current reading without stepping
    pub fn peek_ms(&self) -> u64 {
        self.now_us.load(core::sync::atomic::Ordering::SeqCst) / 1000
    }
}

#[cfg(test)]
impl Clock for TestClock {
    fn now_us(&self) -> u64 {
        self.now_us
            .fetch_add(self.step_us, core::sync::atomic::Ordering::SeqCst)
    }
}
