use std::path::Path;

use anyhow::{Context, Result};
use enhancer_archive::AsarCodec;
use enhancer_installer::{
    extract_only, inspect, patch_with_hooks, unpatch, PatchOptions, PatchReport, TargetLayout,
};
use tracing::debug;

use crate::completion::write_completions_script;
use crate::config::{build_patch_options, load_config, resolve_layout, LoadedConfig, PatchFlags};
use crate::render::{format_patch_summary, format_status_lines, PatchProgress, TerminalRenderer};
use crate::{Cli, Commands};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let Cli {
        resources,
        install_root,
        config,
        command,
        ..
    } = cli;
    let target = || {
        resolve_target(
            config.as_deref(),
            resources.as_deref(),
            install_root.as_deref(),
        )
    };
    let renderer = TerminalRenderer::current();

    match command {
        Commands::Patch {
            dev_tools,
            downloader,
            keep_source,
            skip_dependency,
        } => {
            let (loaded, layout) = target()?;
            let flags = PatchFlags {
                dev_tools,
                downloader,
                keep_source,
                skip_dependency,
            };
            let options = build_patch_options(&loaded, flags)?;
            run_patch_command(&layout, &options, renderer)?;
        }
        Commands::Unpatch => {
            let (_, layout) = target()?;
            unpatch(&layout).with_context(|| {
                format!("failed to unpatch {}", layout.resources_dir().display())
            })?;
            renderer.print_status(
                "unpatched",
                &layout.working_archive_path().display().to_string(),
            );
        }
        Commands::Extract { backup } => {
            let (_, layout) = target()?;
            let source_tree = extract_only(&layout, backup).with_context(|| {
                format!("failed to extract {}", layout.resources_dir().display())
            })?;
            renderer.print_status("extracted", &source_tree.display().to_string());
        }
        Commands::Status => {
            let (_, layout) = target()?;
            let status = inspect(&layout);
            renderer.print_section("target");
            renderer.print_lines(&format_status_lines(&layout, &status));
        }
        Commands::Completions { shell } => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            write_completions_script(shell, &mut handle)?;
        }
    }

    Ok(())
}

fn resolve_target(
    config: Option<&Path>,
    resources: Option<&Path>,
    install_root: Option<&Path>,
) -> Result<(LoadedConfig, TargetLayout)> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let loaded = load_config(config, &cwd)?;
    let layout = resolve_layout(resources, install_root, &loaded)?;
    debug!(resources = %layout.resources_dir().display(), "target resolved");
    Ok((loaded, layout))
}

fn run_patch_command(
    layout: &TargetLayout,
    options: &PatchOptions,
    renderer: TerminalRenderer,
) -> Result<PatchReport> {
    let mut progress = PatchProgress::new(renderer);
    let result = patch_with_hooks(layout, options, &AsarCodec, &mut progress);
    progress.finish(result.is_ok());
    let report = result
        .with_context(|| format!("failed to patch {}", layout.resources_dir().display()))?;

    renderer.print_lines(&format_patch_summary(&report));
    renderer.print_status("patched", &layout.working_archive_path().display().to_string());
    Ok(report)
}
