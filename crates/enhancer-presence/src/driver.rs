use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::machine::{PresenceCommand, PresenceEvent, PresenceMachine, PresenceTimings};
use crate::sink::{SettingsStore, StatusSink};

pub const SETTINGS_POLL_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_BUFFER: usize = 64;

/// Runs a [`PresenceMachine`] on the current task: events arrive over a
/// channel, timers fire from `select!`, and the settings flag is polled.
pub struct PresenceDriver<S, P> {
    machine: PresenceMachine,
    sink: S,
    settings: P,
    events: mpsc::Receiver<PresenceEvent>,
    poll_interval: Duration,
}

impl<S, P> PresenceDriver<S, P>
where
    S: StatusSink,
    P: SettingsStore,
{
    pub fn new(
        timings: PresenceTimings,
        sink: S,
        settings: P,
    ) -> (Self, mpsc::Sender<PresenceEvent>) {
        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let machine = PresenceMachine::new(timings, settings.presence_disabled());
        (
            Self {
                machine,
                sink,
                settings,
                events,
                poll_interval: SETTINGS_POLL_INTERVAL,
            },
            sender,
        )
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Runs until every event sender is dropped, then hands the sink back.
    pub async fn run(mut self) -> S {
        let mut poll = time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let commands = self.machine.start(Instant::now());
        self.execute(commands);

        loop {
            let deadline = self.machine.next_deadline();
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    debug!(?event, "presence event");
                    let commands = self.machine.handle(event, Instant::now());
                    self.execute(commands);
                }
                _ = sleep_until_deadline(deadline) => {
                    let commands = self.machine.poll_timers(Instant::now());
                    self.execute(commands);
                }
                _ = poll.tick() => {
                    let disabled = self.settings.presence_disabled();
                    if disabled != self.machine.state().user_disabled {
                        info!(disabled, "presence toggled from settings");
                        let commands = self
                            .machine
                            .handle(PresenceEvent::UserToggleDisabled(disabled), Instant::now());
                        self.execute(commands);
                    }
                }
            }
        }

        self.sink
    }

    fn execute(&mut self, commands: Vec<PresenceCommand>) {
        for command in commands {
            let result = match &command {
                PresenceCommand::Login => self.sink.login(),
                PresenceCommand::SetActivity(activity) => self.sink.set_activity(activity),
                PresenceCommand::ClearActivity => self.sink.clear_activity(),
            };
            if let Err(err) = result {
                warn!(?command, error = %err, "status sink call failed");
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
