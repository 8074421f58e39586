//! tests/common/harness.rs
use kestrel_timer::{ClockMode, Config, Result, TimeBase, Timer};
use std::sync::{
    Arc, Once,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "kestrel_timer=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::FULL)
            .with_test_writer()
            .init();
    });
}

/// A millisecond time base the test moves by hand.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    now: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl TimeBase for SimulatedClock {
    fn now(&self) -> Result<u64> {
        Ok(self.now.load(Ordering::SeqCst))
    }

    fn unit(&self) -> Duration {
        Duration::from_millis(1)
    }

    fn mode(&self) -> ClockMode {
        ClockMode::Precise
    }
}

/// A timer driven by a fresh `SimulatedClock`.
pub fn simulated_timer(capacity: usize) -> (Timer, SimulatedClock) {
    init_tracing();
    let clock = SimulatedClock::default();
    let timer = Timer::with_time_base(
        Config::new(capacity, ClockMode::Precise),
        Arc::new(clock.clone()),
    )
    .expect("Failed to create simulated timer");
    (timer, clock)
}
