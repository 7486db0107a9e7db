use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::timer::{TimerHandle, TimerSlot};

pub const LISTENING_ACTIVITY: u8 = 2;
const SMALL_IMAGE_KEY: &str = "tidal";
const SMALL_IMAGE_TEXT: &str = "TIDAL Enhanced";
const PLAY_BUTTON_LABEL: &str = "Play on TIDAL";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresenceTimings {
    pub debounce: Duration,
    pub idle_clear: Duration,
    pub reconnect: Duration,
    /// Elapsed-time reports closer than this to the last one are noise.
    pub elapsed_jump_seconds: f64,
}

impl Default for PresenceTimings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            idle_clear: Duration::from_secs(10),
            reconnect: Duration::from_secs(5),
            elapsed_jump_seconds: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub artwork_key: Option<String>,
    pub duration_seconds: f64,
    #[serde(default)]
    pub action_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityButton {
    pub label: String,
    pub url: String,
}

/// Payload pushed to the status sink, shaped like a rich-presence activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: u8,
    pub details: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_image_text: Option<String>,
    pub small_image_key: String,
    pub small_image_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ActivityButton>,
    pub instance: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    ConnectionReady,
    ConnectionLost,
    MediaItemChanged(MediaItem),
    ElapsedTimeReport(f64),
    PlayingChanged(bool),
    UserToggleDisabled(bool),
}

/// Calls the driver makes against the status sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceCommand {
    Login,
    SetActivity(Activity),
    ClearActivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Debounce,
    IdleClear,
    Reconnect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceState {
    pub media_item: Option<MediaItem>,
    pub elapsed_seconds: f64,
    pub is_playing: bool,
    pub connection_ready: bool,
    pub user_disabled: bool,
}

/// Event-driven presence logic. Owns no clock or I/O: callers pass `now` and
/// execute the returned commands.
#[derive(Debug)]
pub struct PresenceMachine {
    state: PresenceState,
    timings: PresenceTimings,
    debounce: TimerSlot,
    idle_clear: TimerSlot,
    reconnect: TimerSlot,
}

impl PresenceMachine {
    pub fn new(timings: PresenceTimings, user_disabled: bool) -> Self {
        Self {
            state: PresenceState {
                user_disabled,
                ..PresenceState::default()
            },
            timings,
            debounce: TimerSlot::default(),
            idle_clear: TimerSlot::default(),
            reconnect: TimerSlot::default(),
        }
    }

    pub fn state(&self) -> &PresenceState {
        &self.state
    }

    pub fn timer(&self, kind: TimerKind) -> &TimerSlot {
        match kind {
            TimerKind::Debounce => &self.debounce,
            TimerKind::IdleClear => &self.idle_clear,
            TimerKind::Reconnect => &self.reconnect,
        }
    }

    fn timer_mut(&mut self, kind: TimerKind) -> &mut TimerSlot {
        match kind {
            TimerKind::Debounce => &mut self.debounce,
            TimerKind::IdleClear => &mut self.idle_clear,
            TimerKind::Reconnect => &mut self.reconnect,
        }
    }

    /// Initial login; the reconnect loop keeps retrying until ready.
    pub fn start(&mut self, now: Instant) -> Vec<PresenceCommand> {
        if self.state.user_disabled {
            return Vec::new();
        }
        self.reconnect.arm(now + self.timings.reconnect);
        vec![PresenceCommand::Login]
    }

    pub fn handle(&mut self, event: PresenceEvent, now: Instant) -> Vec<PresenceCommand> {
        match event {
            PresenceEvent::ConnectionReady => {
                self.state.connection_ready = true;
                self.reconnect.cancel();
                if self.state.media_item.is_some() {
                    self.debounce.cancel();
                    return self.recompute(now);
                }
                Vec::new()
            }
            PresenceEvent::ConnectionLost => {
                self.state.connection_ready = false;
                if !self.state.user_disabled && !self.reconnect.is_armed() {
                    self.reconnect.arm(now + self.timings.reconnect);
                }
                Vec::new()
            }
            PresenceEvent::MediaItemChanged(item) => {
                self.state.media_item = Some(item);
                self.schedule_recompute(now);
                Vec::new()
            }
            PresenceEvent::ElapsedTimeReport(seconds) => {
                let jump = (seconds - self.state.elapsed_seconds).abs();
                self.state.elapsed_seconds = seconds;
                if self.state.is_playing && jump > self.timings.elapsed_jump_seconds {
                    self.schedule_recompute(now);
                }
                Vec::new()
            }
            PresenceEvent::PlayingChanged(is_playing) => {
                self.state.is_playing = is_playing;
                if is_playing {
                    self.idle_clear.cancel();
                }
                self.schedule_recompute(now);
                Vec::new()
            }
            PresenceEvent::UserToggleDisabled(disabled) => self.set_user_disabled(disabled, now),
        }
    }

    fn set_user_disabled(&mut self, disabled: bool, now: Instant) -> Vec<PresenceCommand> {
        if self.state.user_disabled == disabled {
            return Vec::new();
        }
        self.state.user_disabled = disabled;

        if disabled {
            self.debounce.cancel();
            self.idle_clear.cancel();
            self.reconnect.cancel();
            return vec![PresenceCommand::ClearActivity];
        }

        let mut commands = Vec::new();
        if !self.state.connection_ready {
            commands.push(PresenceCommand::Login);
            self.reconnect.arm(now + self.timings.reconnect);
        }
        commands.extend(self.recompute(now));
        commands
    }

    fn schedule_recompute(&mut self, now: Instant) {
        self.debounce.arm(now + self.timings.debounce);
    }

    /// Earliest armed deadline across all timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        [&self.debounce, &self.idle_clear, &self.reconnect]
            .into_iter()
            .filter_map(TimerSlot::deadline)
            .min()
    }

    /// Fires every timer whose deadline has passed at `now`.
    pub fn poll_timers(&mut self, now: Instant) -> Vec<PresenceCommand> {
        let mut commands = Vec::new();
        for kind in [TimerKind::Debounce, TimerKind::IdleClear, TimerKind::Reconnect] {
            if let Some(handle) = self.timer(kind).due(now) {
                commands.extend(self.fire(kind, handle, now));
            }
        }
        commands
    }

    /// Runs the effect of one timer. Stale handles are ignored.
    pub fn fire(
        &mut self,
        kind: TimerKind,
        handle: TimerHandle,
        now: Instant,
    ) -> Vec<PresenceCommand> {
        if !self.timer_mut(kind).consume(handle) {
            debug!(?kind, "ignoring stale presence timer");
            return Vec::new();
        }

        match kind {
            TimerKind::Debounce => self.recompute(now),
            TimerKind::IdleClear => {
                if self.state.user_disabled || !self.state.connection_ready {
                    return Vec::new();
                }
                debug!("presence cleared after idle period");
                vec![PresenceCommand::ClearActivity]
            }
            TimerKind::Reconnect => {
                if self.state.connection_ready || self.state.user_disabled {
                    return Vec::new();
                }
                self.reconnect.arm(now + self.timings.reconnect);
                vec![PresenceCommand::Login]
            }
        }
    }

    fn recompute(&mut self, now: Instant) -> Vec<PresenceCommand> {
        if self.state.user_disabled || !self.state.connection_ready {
            return Vec::new();
        }
        let Some(item) = &self.state.media_item else {
            return Vec::new();
        };

        let mut activity = Activity {
            activity_type: LISTENING_ACTIVITY,
            details: item.title.clone(),
            state: item.artist.clone(),
            large_image_key: item.artwork_key.clone(),
            large_image_text: item.album.clone(),
            small_image_key: SMALL_IMAGE_KEY.to_string(),
            small_image_text: SMALL_IMAGE_TEXT.to_string(),
            buttons: item
                .action_url
                .iter()
                .map(|url| ActivityButton {
                    label: PLAY_BUTTON_LABEL.to_string(),
                    url: url.clone(),
                })
                .collect(),
            instance: true,
            start_timestamp: None,
            end_timestamp: None,
        };

        if self.state.is_playing {
            let start = unix_millis().saturating_sub(seconds_to_millis(self.state.elapsed_seconds));
            activity.start_timestamp = Some(start);
            activity.end_timestamp =
                duration_millis(item.duration_seconds).map(|length| start.saturating_add(length));
            self.idle_clear.cancel();
        } else {
            self.idle_clear.arm(now + self.timings.idle_clear);
        }

        vec![PresenceCommand::SetActivity(activity)]
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Track lengths that are not positive, not finite or longer than this are
/// reported without an end timestamp.
const MAX_DURATION_SECONDS: f64 = 24.0 * 60.0 * 60.0;

fn duration_millis(seconds: f64) -> Option<u64> {
    (seconds.is_finite() && seconds > 0.0 && seconds <= MAX_DURATION_SECONDS)
        .then(|| seconds_to_millis(seconds))
}

fn seconds_to_millis(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}
