use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use enhancer_core::Recipe;
use enhancer_installer::{resolve_resources_dir, PatchOptions, TargetLayout};
use serde::Deserialize;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "enhancer.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EnhancerConfig {
    pub(crate) resources_dir: Option<PathBuf>,
    #[serde(default)]
    pub(crate) keep_source_tree: bool,
    #[serde(default)]
    pub(crate) recipes: Vec<PathBuf>,
    #[serde(default)]
    pub(crate) features: FeaturesConfig,
    #[serde(default)]
    pub(crate) presence: PresenceConfig,
    #[serde(default)]
    pub(crate) downloader: DownloaderConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FeaturesConfig {
    pub(crate) dev_tools: Option<bool>,
    pub(crate) downloader: Option<bool>,
    pub(crate) help_links: Option<bool>,
    pub(crate) tray_menu: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PresenceConfig {
    pub(crate) client_id: Option<String>,
    pub(crate) install_dependency: Option<bool>,
    pub(crate) npm_program: Option<String>,
    pub(crate) package: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DownloaderConfig {
    pub(crate) helper_path: Option<PathBuf>,
}

/// Parsed config plus the directory its relative paths resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoadedConfig {
    pub(crate) config: EnhancerConfig,
    pub(crate) base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PatchFlags {
    pub(crate) dev_tools: bool,
    pub(crate) downloader: bool,
    pub(crate) keep_source: bool,
    pub(crate) skip_dependency: bool,
}

pub(crate) fn parse_config(input: &str) -> Result<EnhancerConfig> {
    let config: EnhancerConfig =
        toml::from_str(input).context("failed to parse enhancer config")?;
    if let Some(client_id) = &config.presence.client_id {
        validate_client_id(client_id)?;
    }
    Ok(config)
}

fn validate_client_id(client_id: &str) -> Result<()> {
    if client_id.is_empty() || !client_id.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(anyhow!(
            "presence client_id must be a non-empty string of digits: '{client_id}'"
        ));
    }
    Ok(())
}

/// An explicit path must exist; otherwise `./enhancer.toml` is read when present.
pub(crate) fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => cwd.join(path),
        None => {
            let candidate = cwd.join(DEFAULT_CONFIG_FILE);
            if !candidate.is_file() {
                return Ok(LoadedConfig {
                    config: EnhancerConfig::default(),
                    base_dir: cwd.to_path_buf(),
                });
            }
            candidate
        }
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let config =
        parse_config(&raw).with_context(|| format!("invalid config: {}", path.display()))?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.to_path_buf());
    Ok(LoadedConfig { config, base_dir })
}

/// Flags win over the config file, which wins over the install-root default.
pub(crate) fn resolve_layout(
    resources: Option<&Path>,
    install_root: Option<&Path>,
    loaded: &LoadedConfig,
) -> Result<TargetLayout> {
    if let Some(resources) = resources {
        return Ok(TargetLayout::new(resources));
    }
    if let Some(install_root) = install_root {
        let resolved = resolve_resources_dir(install_root).with_context(|| {
            format!(
                "failed to locate resources under install root: {}",
                install_root.display()
            )
        })?;
        return Ok(TargetLayout::new(resolved));
    }
    if let Some(configured) = &loaded.config.resources_dir {
        return Ok(TargetLayout::new(loaded.base_dir.join(configured)));
    }
    Err(anyhow!(
        "no target given: pass --resources or --install-root, or set resources_dir in {DEFAULT_CONFIG_FILE}"
    ))
}

pub(crate) fn build_patch_options(
    loaded: &LoadedConfig,
    flags: PatchFlags,
) -> Result<PatchOptions> {
    let config = &loaded.config;
    let mut options = PatchOptions::default();

    let features = &config.features;
    options.features.tray_menu = features.tray_menu.unwrap_or(options.features.tray_menu);
    options.features.help_links = features.help_links.unwrap_or(options.features.help_links);
    options.features.dev_tools =
        flags.dev_tools || features.dev_tools.unwrap_or(options.features.dev_tools);
    options.features.downloader =
        flags.downloader || features.downloader.unwrap_or(options.features.downloader);

    let presence = &config.presence;
    if let Some(client_id) = &presence.client_id {
        options.presence.client_id = client_id.clone();
    }
    if let Some(npm_program) = &presence.npm_program {
        options.presence.npm_program = npm_program.clone();
    }
    if let Some(package) = &presence.package {
        options.presence.package = package.clone();
    }
    options.presence.install_dependency = !flags.skip_dependency
        && presence
            .install_dependency
            .unwrap_or(options.presence.install_dependency);

    options.downloader_helper = config
        .downloader
        .helper_path
        .as_ref()
        .map(|path| loaded.base_dir.join(path));
    options.keep_source_tree = flags.keep_source || config.keep_source_tree;

    for recipe_path in &config.recipes {
        options.recipes.push(load_recipe(&loaded.base_dir.join(recipe_path))?);
    }

    Ok(options)
}

fn load_recipe(path: &Path) -> Result<Recipe> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read recipe: {}", path.display()))?;
    Recipe::from_toml_str(&raw).with_context(|| format!("invalid recipe: {}", path.display()))
}
