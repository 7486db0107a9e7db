mod error;
mod fs_utils;
mod layout;
mod lock;
mod options;
mod pipeline;
mod steps;

pub use error::{PipelineError, StepError};
pub use layout::{resolve_resources_dir, TargetLayout};
pub use lock::PipelineLock;
pub use options::{
    FeatureSet, PatchOptions, PresenceOptions, DEFAULT_NPM_PROGRAM, DEFAULT_PRESENCE_CLIENT_ID,
    DEFAULT_PRESENCE_PACKAGE,
};
pub use pipeline::{
    extract_only, inspect, patch, patch_pristine, patch_state, patch_with_codec,
    patch_with_hooks, unpatch, PatchReport, PatchState, PipelineObserver, PipelineStage,
    SilentObserver, StepOutcome, StepReport, TargetStatus,
};
pub use steps::{execute_step, installer_steps, InstallerStep, StepAction};

#[cfg(test)]
mod tests;
