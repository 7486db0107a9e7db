use std::path::PathBuf;

use enhancer_core::Recipe;

pub const DEFAULT_PRESENCE_CLIENT_ID: &str = "1004259730526584873";
pub const DEFAULT_PRESENCE_PACKAGE: &str = "@xhayper/discord-rpc";

#[cfg(windows)]
pub const DEFAULT_NPM_PROGRAM: &str = "npm.cmd";
#[cfg(not(windows))]
pub const DEFAULT_NPM_PROGRAM: &str = "npm";

/// Optional built-in steps. Presence wiring always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSet {
    pub tray_menu: bool,
    pub help_links: bool,
    pub dev_tools: bool,
    pub downloader: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            tray_menu: true,
            help_links: true,
            dev_tools: false,
            downloader: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceOptions {
    pub client_id: String,
    pub install_dependency: bool,
    pub npm_program: String,
    pub package: String,
}

impl Default for PresenceOptions {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_PRESENCE_CLIENT_ID.to_string(),
            install_dependency: true,
            npm_program: DEFAULT_NPM_PROGRAM.to_string(),
            package: DEFAULT_PRESENCE_PACKAGE.to_string(),
        }
    }
}

/// Everything a patch run needs besides the target paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    pub features: FeatureSet,
    pub presence: PresenceOptions,
    pub downloader_helper: Option<PathBuf>,
    pub keep_source_tree: bool,
    pub recipes: Vec<Recipe>,
}
