//! Progress reporting contract between the pipeline and its front end.
//!
//! The front end supplies one [`ProgressReporter`]; both components receive
//! it explicitly instead of relying on ambient global state, so tests can
//! observe (or silence) progress.

/// Callback surface for pipeline progress.
///
/// `fraction` is monotonically non-decreasing within one run and stays in
/// `[0, 1]`; `message` is a short human-readable phase description.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}

/// Maps a nested stage's `[0, 1]` progress into a sub-range of the whole
/// run, so the combined stream of fractions stays monotonic.
pub struct ScaledProgress<'a> {
    inner: &'a dyn ProgressReporter,
    start: f64,
    end: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a dyn ProgressReporter, start: f64, end: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&start) && start <= end && end <= 1.0);
        Self { inner, start, end }
    }
}

impl ProgressReporter for ScaledProgress<'_> {
    fn report(&self, fraction: f64, message: &str) {
        let clamped = fraction.clamp(0.0, 1.0);
        let scaled = self.start + clamped * (self.end - self.start);
        self.inner.report(scaled, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every reported fraction for assertions.
    pub struct RecordingProgress(pub Mutex<Vec<f64>>);

    impl RecordingProgress {
        pub fn new() -> Self {
            Self(Mutex::new(Vec::new()))
        }
    }

    impl ProgressReporter for RecordingProgress {
        fn report(&self, fraction: f64, _message: &str) {
            self.0.lock().unwrap().push(fraction);
        }
    }

    #[test]
    fn scaled_progress_stays_in_range_and_monotonic() {
        let rec = RecordingProgress::new();
        let scaled = ScaledProgress::new(&rec, 0.1, 0.8);

        for f in [0.0, 0.25, 0.5, 1.0, 1.5] {
            scaled.report(f, "step");
        }

        let seen = rec.0.lock().unwrap();
        assert!((seen[0] - 0.1).abs() < 1e-9);
        assert!((seen[3] - 0.8).abs() < 1e-9);
        // Out-of-range input clamps instead of overshooting.
        assert!((seen[4] - 0.8).abs() < 1e-9);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }
}
