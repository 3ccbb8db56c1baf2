//! OHCI driver configuration

/// Where root hub debounce waits run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceMode {
    /// Busy-wait inside the interrupt handler, then notify.
    ///
    /// The interrupt path stalls for the whole debounce interval (150 ms on
    /// connect, 200 ms on disconnect); nothing else is serviced meanwhile.
    Inline,
    /// Record the event in interrupt context and deliver it from
    /// [`OhciHost::poll_deferred`](super::OhciHost::poll_deferred) once the
    /// debounce interval has elapsed.
    Deferred,
}

/// Tunables for [`OhciHost`](super::OhciHost)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OhciConfig {
    /// Settle time after a connect before `device_connected`
    pub connect_debounce_ms: u64,
    /// Settle time after a disconnect before `device_disconnected`
    pub disconnect_debounce_ms: u64,
    pub debounce_mode: DebounceMode,
    /// Upper bound for the port to drop PRS after a reset request
    pub port_reset_timeout_ms: u64,
    /// Recovery time after port reset completes
    pub port_reset_recovery_ms: u64,
    /// Upper bound for HcCommandStatus.HCR to self-clear
    pub controller_reset_timeout_ms: u64,
    /// Wait after switching on port power
    pub power_on_delay_ms: u64,
}

impl OhciConfig {
    pub const fn new() -> Self {
        Self {
            connect_debounce_ms: 150,
            disconnect_debounce_ms: 200,
            debounce_mode: DebounceMode::Inline,
            port_reset_timeout_ms: 100,
            port_reset_recovery_ms: 10,
            controller_reset_timeout_ms: 100,
            power_on_delay_ms: 100,
        }
    }

    /// Same timings, debounce moved out of interrupt context
    pub const fn deferred() -> Self {
        Self {
            debounce_mode: DebounceMode::Deferred,
            ..Self::new()
        }
    }
}

impl Default for OhciConfig {
    fn default() -> Self {
        Self::new()
    }
}
