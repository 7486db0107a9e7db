use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use enhancer_installer::{
    PatchReport, PipelineObserver, PipelineStage, StepOutcome, StepReport, TargetLayout,
    TargetStatus,
};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};

use crate::{current_output_style, OutputStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum UiMode {
    Plain,
    Interactive,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
    mode: UiMode,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self {
            style,
            mode: ui_mode_from_style(style),
        }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.mode, title) {
            println!();
            let rendered = match self.style {
                OutputStyle::Plain => line,
                OutputStyle::Rich => colorize(section_style(), &line),
            };
            println!("{rendered}");
        }
    }

    pub(crate) fn start_progress(self, label: &str, total: u64) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] {pos:>3}/{len:3} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars("\\|/- ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

impl TerminalProgress {
    fn set(&mut self, current: u64) {
        self.current = current.min(self.total);

        let Some(progress_bar) = &self.progress_bar else {
            return;
        };

        let safe_total = self.total.max(1);
        progress_bar.set_length(safe_total);
        progress_bar.set_position(self.current.min(safe_total));
    }

    /// Prints above the bar when one is drawn so the line is not overwritten.
    fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.println(line),
            None => println!("{line}"),
        }
    }

    fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

/// Draws pipeline progress: stage lines, then a bar across installer steps.
pub(crate) struct PatchProgress {
    renderer: TerminalRenderer,
    steps: Option<TerminalProgress>,
}

impl PatchProgress {
    pub(crate) fn new(renderer: TerminalRenderer) -> Self {
        Self {
            renderer,
            steps: None,
        }
    }

    pub(crate) fn finish(mut self, succeeded: bool) {
        if let Some(progress) = self.steps.take() {
            if succeeded {
                progress.finish_success();
            } else {
                progress.finish_abandon();
            }
        }
    }
}

impl PipelineObserver for PatchProgress {
    fn stage(&mut self, stage: PipelineStage) {
        if stage == PipelineStage::BackingUp {
            if let Some(progress) = self.steps.take() {
                progress.finish_success();
            }
        }
        self.renderer.print_status("stage", stage_label(stage));
    }

    fn step_started(&mut self, index: usize, total: usize, name: &str) {
        let renderer = self.renderer;
        let progress = self
            .steps
            .get_or_insert_with(|| renderer.start_progress("patch", total as u64));
        progress.set(index as u64);
        if let Some(progress_bar) = &progress.progress_bar {
            progress_bar.set_message(name.to_string());
        }
    }

    fn step_finished(&mut self, report: &StepReport) {
        let style = self.renderer.style;
        if let Some(progress) = self.steps.as_mut() {
            progress.println(&render_step_line(style, report));
            let next = progress.current + 1;
            progress.set(next);
        }
    }
}

pub(crate) fn stage_label(stage: PipelineStage) -> &'static str {
    match stage {
        PipelineStage::Reverting => "reverting previous patch",
        PipelineStage::Extracting => "extracting archive",
        PipelineStage::BackingUp => "backing up original archive",
        PipelineStage::Repacking => "repacking archive",
        PipelineStage::RollingBack => "rolling back",
        PipelineStage::RemovingSourceTree => "removing source tree",
    }
}

pub(crate) fn format_step_line(report: &StepReport) -> String {
    match &report.outcome {
        StepOutcome::Applied { warnings } if warnings.is_empty() => {
            format!("applied {}", report.name)
        }
        StepOutcome::Applied { warnings } => format!(
            "applied {} ({} missing reference(s))",
            report.name,
            warnings.len()
        ),
        StepOutcome::Skipped => format!("skipped {}", report.name),
        StepOutcome::Abandoned { reason } => format!("abandoned {}: {reason}", report.name),
    }
}

fn render_step_line(style: OutputStyle, report: &StepReport) -> String {
    let line = format_step_line(report);
    match (style, &report.outcome) {
        (OutputStyle::Plain, _) => line,
        (OutputStyle::Rich, StepOutcome::Abandoned { .. }) => colorize(error_style(), &line),
        (OutputStyle::Rich, StepOutcome::Applied { warnings }) if !warnings.is_empty() => {
            colorize(warning_style(), &line)
        }
        (OutputStyle::Rich, _) => line,
    }
}

pub(crate) fn format_patch_summary(report: &PatchReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.auto_reverted {
        lines.push("previous patch was reverted before patching".to_string());
    }
    for step in &report.steps {
        if let StepOutcome::Applied { warnings } = &step.outcome {
            for warning in warnings {
                lines.push(format!(
                    "warning: {}: reference {} not found in {}",
                    step.name,
                    warning.reference,
                    warning.file.display()
                ));
            }
        }
    }
    let applied = report
        .steps
        .iter()
        .filter(|step| matches!(step.outcome, StepOutcome::Applied { .. }))
        .count();
    lines.push(format!(
        "steps: {applied} applied, {} abandoned, {} warning(s)",
        report.abandoned_count(),
        report.warning_count()
    ));
    if report.source_tree_kept {
        lines.push("source tree kept".to_string());
    }
    lines
}

pub(crate) fn format_status_lines(layout: &TargetLayout, status: &TargetStatus) -> Vec<String> {
    let mut lines = vec![
        format!("resources: {}", layout.resources_dir().display()),
        format!("state: {}", status.state.as_str()),
        format!(
            "working archive: {}",
            presence_label(status.working_archive_present)
        ),
        format!(
            "source tree: {}",
            presence_label(status.source_tree_present)
        ),
    ];
    if let Some(holder) = &status.lock_holder {
        lines.push(format!("locked by: {holder}"));
        lines.push(format!(
            "lock file: {} (delete it if no enhancer run is active)",
            layout.lock_path().display()
        ));
    }
    lines
}

fn presence_label(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "missing"
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn status_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightGreen.into()))
        .effects(Effects::BOLD)
}

fn warning_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::Yellow.into()))
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn ui_mode_from_style(style: OutputStyle) -> UiMode {
    match style {
        OutputStyle::Plain => UiMode::Plain,
        OutputStyle::Rich => UiMode::Interactive,
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{status}: {message}"),
        OutputStyle::Rich => format!("{:>10} {message}", colorize(status_style(), status)),
    }
}

fn render_section_header(mode: UiMode, title: &str) -> Option<String> {
    match mode {
        UiMode::Plain => None,
        UiMode::Interactive => Some(format!("== {title} ==")),
    }
}

pub(crate) fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!("{}/{}", HumanCount(current), HumanCount(total));
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}
