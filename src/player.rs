use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: u8 = 50;
pub const DEFAULT_PLAYBACK_RATE: f32 = 1.0;

/// Playback settings handed through to the player untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerHints {
    /// 0..=100, larger values are clamped.
    pub volume: u8,
    pub playing: bool,
    pub playback_rate: f32,
}

impl Default for PlayerHints {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            playing: true,
            playback_rate: DEFAULT_PLAYBACK_RATE,
        }
    }
}

impl PlayerHints {
    pub fn volume_fraction(&self) -> f32 {
        f32::from(self.volume.min(100)) / 100.0
    }

    /// Picking a channel starts playback at normal speed.
    pub fn on_select(self) -> Self {
        Self {
            playing: true,
            playback_rate: DEFAULT_PLAYBACK_RATE,
            ..self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Playback {
    pub url: String,
    pub volume: f32,
    pub playing: bool,
    pub playback_rate: f32,
}

impl Playback {
    pub fn new(url: &str, hints: &PlayerHints) -> Self {
        Self {
            url: url.to_string(),
            volume: hints.volume_fraction(),
            playing: hints.playing,
            playback_rate: hints.playback_rate,
        }
    }
}
