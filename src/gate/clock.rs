//! Playback clock capability

/// What the gate needs from a media element.
///
/// Browser shells back this with the `<video>` element; tests and headless hosts
/// use [`ManualClock`].
pub trait PlaybackClock {
    /// Current playback position in seconds
    fn current_time(&self) -> f64;
    /// Media duration once metadata is loaded
    fn duration(&self) -> Option<f64>;
    fn is_playing(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
}

/// Clock driven by explicit calls
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    position: f64,
    duration: Option<f64>,
    playing: bool,
    pause_calls: usize,
}

impl ManualClock {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Let `secs` of media time pass if playing. Stops at the end of the media.
    pub fn advance(&mut self, secs: f64) {
        if !self.playing {
            return;
        }
        self.position += secs;
        if let Some(duration) = self.duration {
            if self.position >= duration {
                self.position = duration;
                self.playing = false;
            }
        }
    }

    /// Number of times `pause` was called
    pub fn pause_calls(&self) -> usize {
        self.pause_calls
    }
}

impl PlaybackClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.pause_calls += 1;
        self.playing = false;
    }

    fn seek(&mut self, position: f64) {
        let upper = self.duration.unwrap_or(f64::MAX);
        self.position = position.clamp(0.0, upper);
    }
}
