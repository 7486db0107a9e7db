use thiserror::Error;

use crate::machine::Activity;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("status client is not connected")]
    NotConnected,
    #[error("status client rejected the request: {0}")]
    Rejected(String),
}

/// External status-reporting client.
pub trait StatusSink {
    fn login(&mut self) -> Result<(), SinkError>;

    fn set_activity(&mut self, activity: &Activity) -> Result<(), SinkError>;

    fn clear_activity(&mut self) -> Result<(), SinkError>;
}

/// Read access to the persisted "presence disabled" flag.
pub trait SettingsStore {
    fn presence_disabled(&self) -> bool;
}
