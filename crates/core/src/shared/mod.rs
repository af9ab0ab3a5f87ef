use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    BeatEventSink, BeatPulseError, BeatTrackingSession, DetectorConfig, ResetScope, Result,
    SessionConfig, StreamId, TapOutcome,
};

/// Thread-safe handle over a [`BeatTrackingSession`].
///
/// Lets a host feed analysis frames from its audio thread while taps arrive
/// on an input thread. The mutex serialises every call, so the session still
/// only ever sees one caller at a time.
#[derive(Clone)]
pub struct SharedSession {
    shared: Arc<Mutex<BeatTrackingSession>>,
}

impl SharedSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        Ok(Self::from_session(BeatTrackingSession::new(config)?))
    }

    pub fn from_session(session: BeatTrackingSession) -> Self {
        Self {
            shared: Arc::new(Mutex::new(session)),
        }
    }

    pub fn process_feature_frame<S>(
        &self,
        value: f64,
        timestamp_ms: f64,
        sink: &mut S,
    ) -> Result<Option<f64>>
    where
        S: BeatEventSink + ?Sized,
    {
        let mut session = self.lock()?;
        Ok(session.process_feature_frame(value, timestamp_ms, sink))
    }

    pub fn register_tap<S>(&self, timestamp_ms: f64, sink: &mut S) -> Result<Option<TapOutcome>>
    where
        S: BeatEventSink + ?Sized,
    {
        let mut session = self.lock()?;
        Ok(session.register_tap(timestamp_ms, sink))
    }

    pub fn current_bpm(&self, stream: StreamId) -> Result<Option<f64>> {
        let session = self.lock()?;
        Ok(session.current_bpm(stream))
    }

    pub fn is_locked(&self, stream: StreamId) -> Result<bool> {
        let session = self.lock()?;
        Ok(session.is_locked(stream))
    }

    pub fn configure(&self, detector: DetectorConfig) -> Result<()> {
        let mut session = self.lock()?;
        session.configure(detector)
    }

    pub fn reset(&self, scope: ResetScope) -> Result<()> {
        let mut session = self.lock()?;
        session.reset(scope);
        Ok(())
    }

    /// Runs `f` with exclusive access to the session.
    pub fn with_session<T>(&self, f: impl FnOnce(&mut BeatTrackingSession) -> T) -> Result<T> {
        let mut session = self.lock()?;
        Ok(f(&mut session))
    }

    fn lock(&self) -> Result<MutexGuard<'_, BeatTrackingSession>> {
        self.shared
            .lock()
            .map_err(|_| BeatPulseError::Poisoned("beat tracking session"))
    }
}

impl std::fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession").finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{BeatEvent, NullSink};

    #[test]
    fn frames_and_taps_from_separate_threads() {
        let shared = SharedSession::new(SessionConfig::default()).unwrap();

        let analysis = shared.clone();
        let frames = thread::spawn(move || {
            let mut events = Vec::new();
            for frame in 1..=300u32 {
                let now = f64::from(frame * 10);
                let value = if frame % 50 == 0 { 1.0 } else { 0.01 };
                analysis
                    .process_feature_frame(value, now, &mut events)
                    .unwrap();
            }
            events
        });

        let input = shared.clone();
        let taps = thread::spawn(move || {
            let mut sink = NullSink;
            for tap in 0..4u32 {
                input
                    .register_tap(f64::from(tap) * 500.0, &mut sink)
                    .unwrap();
            }
        });

        let events = frames.join().unwrap();
        taps.join().unwrap();

        assert!(events.contains(&BeatEvent::BpmLocked {
            stream: StreamId::Track,
            bpm: 120.0,
        }));
        assert_eq!(shared.current_bpm(StreamId::Track).unwrap(), Some(120.0));
        assert_eq!(shared.current_bpm(StreamId::FreeTap).unwrap(), Some(120.0));
    }

    #[test]
    fn reset_through_the_handle() {
        let shared = SharedSession::new(SessionConfig::default()).unwrap();
        shared.register_tap(0.0, &mut NullSink).unwrap();
        shared.reset(ResetScope::All).unwrap();

        let history = shared
            .with_session(|session| session.detector().history_len())
            .unwrap();
        assert_eq!(history, 0);
        assert!(!shared.is_locked(StreamId::Track).unwrap());
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let shared = SharedSession::new(SessionConfig::default()).unwrap();
        let poisoner = shared.clone();
        let _ = thread::spawn(move || {
            poisoner
                .with_session(|_| panic!("analysis thread crashed"))
                .unwrap();
        })
        .join();

        let err = shared.current_bpm(StreamId::Track).unwrap_err();
        assert!(matches!(err, BeatPulseError::Poisoned(_)));
        assert!(format!("{err}").contains("poisoned"));
    }
}
