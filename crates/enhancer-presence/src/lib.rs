//! Presence reporting for the patched application.
//!
//! [`PresenceMachine`] turns playback and connection events into status
//! updates with a debounce window, an idle-clear grace period and a reconnect
//! loop. [`PresenceDriver`] runs it on a tokio task against a [`StatusSink`].

mod driver;
mod machine;
mod sink;
mod timer;

pub use driver::{PresenceDriver, SETTINGS_POLL_INTERVAL};
pub use machine::{
    Activity, ActivityButton, MediaItem, PresenceCommand, PresenceEvent, PresenceMachine,
    PresenceState, PresenceTimings, TimerKind, LISTENING_ACTIVITY,
};
pub use sink::{SettingsStore, SinkError, StatusSink};
pub use timer::{TimerHandle, TimerSlot};
