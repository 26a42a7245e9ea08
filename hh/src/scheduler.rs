//! Leading-edge throttle that coalesces bursts of change events
//!
//! The first call in a quiet period goes through immediately and starts a
//! window; every call inside that window is dropped. Dropped calls are never
//! replayed: only the fact that something changed matters downstream, not
//! which file.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

/// Default coalescing window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Gate deciding whether a call may proceed
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last_permitted: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(window: Duration) -> Self {
        debug!(?window, "Throttle::new: called");
        Self {
            window,
            last_permitted: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to pass the gate now
    pub fn permit(&self) -> bool {
        self.permit_at(Instant::now())
    }

    /// Try to pass the gate at `now`
    ///
    /// The check and the update of the last-permitted marker happen under one
    /// lock, so two near-simultaneous calls cannot both open a window.
    pub fn permit_at(&self, now: Instant) -> bool {
        let mut last = match self.last_permitted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let open = match *last {
            None => true,
            Some(prev) => now.saturating_duration_since(prev) >= self.window,
        };

        if open {
            *last = Some(now);
        }
        debug!(open, "Throttle::permit_at: decided");
        open
    }

    /// Wrap `f` so that it only runs when the gate is open
    pub fn gate<F>(self, f: F) -> Gated<F> {
        Gated { throttle: self, f }
    }
}

/// A function behind a [`Throttle`]
///
/// The wrapped function's return value is handed back to the caller without
/// being awaited or otherwise waited on, so invocations may overlap when the
/// work outlives the window.
pub struct Gated<F> {
    throttle: Throttle,
    f: F,
}

impl<F> Gated<F> {
    /// Invoke the wrapped function if the gate is open
    pub fn call<T, R>(&self, arg: T) -> Option<R>
    where
        F: Fn(T) -> R,
    {
        self.call_at(arg, Instant::now())
    }

    pub fn call_at<T, R>(&self, arg: T, now: Instant) -> Option<R>
    where
        F: Fn(T) -> R,
    {
        if self.throttle.permit_at(now) {
            Some((self.f)(arg))
        } else {
            None
        }
    }

    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_first_call_passes() {
        let throttle = Throttle::new(Duration::from_secs(10));
        assert!(throttle.permit_at(Instant::now()));
    }

    #[test]
    fn test_window_boundary_reopens() {
        let throttle = Throttle::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(throttle.permit_at(t0));
        assert!(!throttle.permit_at(t0 + Duration::from_millis(9_999)));
        assert!(throttle.permit_at(t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_suppressed_calls_do_not_extend_window() {
        let throttle = Throttle::new(Duration::from_secs(10));
        let t0 = Instant::now();

        assert!(throttle.permit_at(t0));
        assert!(!throttle.permit_at(t0 + Duration::from_secs(9)));
        // Measured from the last permitted call, not the last suppressed one
        assert!(throttle.permit_at(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn test_burst_then_later_save() {
        // Five saves within 200ms, then one more 11s later
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let gated = Throttle::new(Duration::from_secs(10)).gate(move |_path: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let t0 = Instant::now();
        for i in 0..5 {
            gated.call_at("src/a.ts", t0 + Duration::from_millis(i * 50));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        gated.call_at("src/a.ts", t0 + Duration::from_secs(11));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_gated_returns_result_only_when_open() {
        let gated = Throttle::new(Duration::from_secs(1)).gate(|n: u32| n * 2);
        let t0 = Instant::now();

        assert_eq!(gated.call_at(21, t0), Some(42));
        assert_eq!(gated.call_at(21, t0 + Duration::from_millis(10)), None);
    }

    #[test]
    fn test_concurrent_callers_open_one_window() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(60)));
        let opened = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let throttle = throttle.clone();
                let opened = opened.clone();
                std::thread::spawn(move || {
                    if throttle.permit() {
                        opened.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_burst_inside_window_invokes_once(
            window_ms in 1u64..60_000,
            offsets in prop::collection::vec(0u64..1_000_000, 1..50),
        ) {
            let throttle = Throttle::new(Duration::from_millis(window_ms));
            let t0 = Instant::now();
            let permitted = offsets
                .iter()
                .map(|o| t0 + Duration::from_millis(o % window_ms))
                .filter(|t| throttle.permit_at(*t))
                .count();
            prop_assert_eq!(permitted, 1);
        }

        #[test]
        fn prop_spaced_calls_are_never_suppressed(
            window_ms in 1u64..60_000,
            gaps in prop::collection::vec(1u64..10_000, 1..50),
        ) {
            let throttle = Throttle::new(Duration::from_millis(window_ms));
            let mut t = Instant::now();
            prop_assert!(throttle.permit_at(t));
            for gap in gaps {
                t += Duration::from_millis(window_ms + gap);
                prop_assert!(throttle.permit_at(t));
            }
        }
    }
}
