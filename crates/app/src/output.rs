use beat_pulse_core::{BeatEvent, BeatEventSink, StreamId};

/// Prints events to stdout as they are emitted.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    json: bool,
}

impl ConsoleSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    fn emit(&self, event: BeatEvent) {
        if self.json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(%err, "failed to encode event"),
            }
            return;
        }

        match event {
            BeatEvent::Onset {
                stream,
                timestamp_ms,
            } => println!("{:>10.1} ms  onset      {}", timestamp_ms, label(stream)),
            BeatEvent::BpmLocked { stream, bpm } => {
                println!("{:>13}  bpm locked {} {bpm:.1}", "", label(stream))
            }
            BeatEvent::BpmUpdated { stream, bpm } => {
                println!("{:>13}  bpm        {} {bpm:.1}", "", label(stream))
            }
        }
    }
}

impl BeatEventSink for ConsoleSink {
    fn on_onset(&mut self, stream: StreamId, timestamp_ms: f64) {
        self.emit(BeatEvent::Onset {
            stream,
            timestamp_ms,
        });
    }

    fn on_bpm_locked(&mut self, stream: StreamId, bpm: f64) {
        self.emit(BeatEvent::BpmLocked { stream, bpm });
    }

    fn on_bpm_updated(&mut self, stream: StreamId, bpm: f64) {
        self.emit(BeatEvent::BpmUpdated { stream, bpm });
    }
}

pub fn label(stream: StreamId) -> &'static str {
    match stream {
        StreamId::Track => "track",
        StreamId::MatchedTap => "matched-tap",
        StreamId::FreeTap => "free-tap",
    }
}
