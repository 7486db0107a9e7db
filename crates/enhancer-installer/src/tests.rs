use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use enhancer_archive::{pack_directory, ArchiveCodec, ArchiveError, AsarCodec};
use enhancer_core::{Modification, Recipe, RecipeFile, Reference};

use super::*;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!(
        "enhancer-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

const MAIN_CONTROLLER: &str = r#"var _electron = require("electron");
class MainController {
  constructor(playbackStatusController) {
    let autoStartDelegate = null;
    this.windowController = new WindowController(applicationDelegate, menuController);
  }
}
"#;

const WINDOW_CONTROLLER: &str = r#"var _electron = require("electron");
class WindowController {
  constructor(applicationDelegate, menuController) {
    this.applicationDelegate = applicationDelegate;
    this.buildTrayMenu();
  }
  onPlaying(isPlaying) {
    this.setThumbBarButtons(!!isPlaying);
  }
  buildTrayMenu() {
    const template = [{
      label: 'Show',
    }];
    const contextMenu = _electron.Menu.buildFromTemplate(template);
    this.tray.setContextMenu(contextMenu);
    this.buildTrayMenu();
  }
}
"#;

const MENU_CONTROLLER: &str = r#"var _electron = require("electron");
class MenuController {
  buildMenu() {
    const template = [];
    const menu = _electron.Menu.buildFromTemplate(template);
    return menu;
  }
  menuClick(item) {
    switch (item.id) {
      case _MenuEventEnum.default.NAVIGATE_HOME:
        break;
      case _MenuEventEnum.default.NAVIGATE_ABOUT:
        break;
      case _MenuEventEnum.default.SUPPORT:
        break;
    }
    if (process.env.NODE_ENV === 'development') {
      this.devMenu = process.env.NODE_ENV === 'development';
    }
  }
}
"#;

const HELP_MENU: &str = r#"function helpMenu(settings, delegate) {
  return [{
    label: settings.locale.data['t-about'],
    click: delegate.menuClick.bind(delegate)
  }, {
    label: 'Support',
  }];
}
"#;

fn write_fixture_app(root: &Path) {
    let main = root.join("app/main");
    let files = [
        ("app/MainController.js", MAIN_CONTROLLER),
        ("window/WindowController.js", WINDOW_CONTROLLER),
        ("menu/MenuController.js", MENU_CONTROLLER),
        ("menu/helpMenu.js", HELP_MENU),
        (
            "menu/MenuEventEnum.js",
            "MenuEvent[\"NAVIGATION\"] = \"navigation\";\nMenuEvent[\"SUPPORT\"] = \"support\";\n",
        ),
        (
            "menu/developerMenu.js",
            "module.exports = [{\n  id: _MenuEventEnum.default.SHOW_RENDERER_DEVTOOLS,\n}];\n",
        ),
        (
            "user/UserSettingsKeysEnum.js",
            "UserSettingsKeys[\"CLOSE_TO_TRAY\"] = \"close.to.tray\";\n",
        ),
        (
            "user/UserSettingsController.js",
            "const defaults = {\n  [_UserSettingsKeysEnum.default.CLOSE_TO_TRAY]: true,\n};\nconst keys = {\n  closeToTray: _UserSettingsKeysEnum.default.CLOSE_TO_TRAY,\n};\n",
        ),
    ];
    for (rel, contents) in files {
        let path = main.join(rel);
        fs::create_dir_all(path.parent().expect("fixture parent")).expect("must create parent");
        fs::write(&path, contents).expect("must write fixture file");
    }
    fs::write(root.join("package.json"), r#"{"name":"tidal","main":"app/main/index.js"}"#)
        .expect("must write package.json");

    let rpc = root.join("node_modules/@xhayper/discord-rpc");
    fs::create_dir_all(&rpc).expect("must create presence package");
    fs::write(rpc.join("package.json"), r#"{"name":"@xhayper/discord-rpc"}"#)
        .expect("must write presence package manifest");
}

fn drop_presence_package(fixture: &Path) {
    fs::remove_dir_all(fixture.join("node_modules")).expect("must drop node_modules");
}

/// Packs a fixture app into `<dir>/resources/app.asar`.
fn seed_target(dir: &Path) -> (TargetLayout, Vec<u8>) {
    seed_target_with(dir, |_| {})
}

fn seed_target_with(dir: &Path, tweak: impl FnOnce(&Path)) -> (TargetLayout, Vec<u8>) {
    let fixture = dir.join("fixture");
    write_fixture_app(&fixture);
    tweak(&fixture);

    let layout = TargetLayout::new(dir.join("resources"));
    fs::create_dir_all(layout.resources_dir()).expect("must create resources dir");
    pack_directory(&fixture, &layout.working_archive_path()).expect("must pack fixture");
    let original = fs::read(layout.working_archive_path()).expect("must read original archive");
    (layout, original)
}

fn offline_options() -> PatchOptions {
    let mut options = PatchOptions::default();
    options.presence.install_dependency = false;
    options
}

fn read_source(layout: &TargetLayout, rel: &str) -> String {
    fs::read_to_string(layout.main_dir().join(rel)).expect("must read patched source")
}

struct FailingRepackCodec;

impl ArchiveCodec for FailingRepackCodec {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
        AsarCodec.extract(archive_path, dest_dir)
    }

    fn repack(&self, _src_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
        fs::write(archive_path, b"half written").expect("must write partial archive");
        Err(ArchiveError::Write {
            path: archive_path.to_path_buf(),
            reason: "disk full".to_string(),
        })
    }
}

/// Loses the backup before failing, so the rollback has nothing to restore.
struct BackupLosingCodec;

impl ArchiveCodec for BackupLosingCodec {
    fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ArchiveError> {
        AsarCodec.extract(archive_path, dest_dir)
    }

    fn repack(&self, _src_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
        let backup = archive_path.with_file_name("app_original.asar");
        fs::remove_file(&backup).expect("must remove backup");
        Err(ArchiveError::Write {
            path: archive_path.to_path_buf(),
            reason: "disk full".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingObserver {
    stages: Vec<PipelineStage>,
    started: Vec<String>,
    finished: usize,
}

impl PipelineObserver for RecordingObserver {
    fn stage(&mut self, stage: PipelineStage) {
        self.stages.push(stage);
    }

    fn step_started(&mut self, _index: usize, _total: usize, name: &str) {
        self.started.push(name.to_string());
    }

    fn step_finished(&mut self, _report: &StepReport) {
        self.finished += 1;
    }
}

#[test]
fn layout_paths_live_under_resources() {
    let layout = TargetLayout::new("/opt/tidal/resources");
    assert_eq!(
        layout.working_archive_path(),
        PathBuf::from("/opt/tidal/resources/app.asar")
    );
    assert_eq!(
        layout.backup_archive_path(),
        PathBuf::from("/opt/tidal/resources/app_original.asar")
    );
    assert_eq!(layout.source_tree_dir(), PathBuf::from("/opt/tidal/resources/src"));
    assert_eq!(
        layout.main_dir(),
        PathBuf::from("/opt/tidal/resources/src/app/main")
    );
    assert_eq!(
        layout.lock_path(),
        PathBuf::from("/opt/tidal/resources/.enhancer.lock")
    );
}

#[test]
fn resolve_resources_dir_picks_highest_versioned_install() {
    let dir = test_dir();
    for name in ["app-2.9.0", "app-2.10.1", "app-beta", "packages"] {
        fs::create_dir_all(dir.join(name).join("resources")).expect("must create install dir");
    }
    fs::create_dir_all(dir.join("app-3.0.0")).expect("must create install without resources");

    let resolved = resolve_resources_dir(&dir).expect("must resolve");
    assert_eq!(resolved, dir.join("app-2.10.1").join("resources"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn resolve_resources_dir_without_installs_is_target_not_found() {
    let dir = test_dir();
    let err = resolve_resources_dir(&dir).expect_err("empty root must fail");
    assert!(matches!(err, PipelineError::TargetNotFound { .. }));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn patch_then_unpatch_restores_original_bytes() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);

    let report = patch(&layout, &offline_options()).expect("must patch");
    assert!(!report.auto_reverted);
    assert_eq!(patch_state(&layout), PatchState::Patched);
    assert_eq!(
        fs::read(layout.backup_archive_path()).expect("must read backup"),
        original
    );
    assert_ne!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );
    assert!(!layout.source_tree_dir().exists(), "source tree is removed by default");
    assert!(!layout.lock_path().exists(), "lock is released");

    unpatch(&layout).expect("must unpatch");
    assert_eq!(patch_state(&layout), PatchState::Pristine);
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );
    assert!(!layout.backup_archive_path().exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn repatching_reverts_first_and_matches_single_patch() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);
    let options = offline_options();

    patch(&layout, &options).expect("first patch");
    let once = fs::read(layout.working_archive_path()).expect("must read first result");

    let report = patch(&layout, &options).expect("second patch");
    assert!(report.auto_reverted);
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read second result"),
        once
    );
    assert_eq!(
        fs::read(layout.backup_archive_path()).expect("must read backup"),
        original
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn failed_repack_restores_working_archive_and_drops_backup() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);

    let err = patch_with_codec(&layout, &offline_options(), &FailingRepackCodec)
        .expect_err("repack failure must propagate");
    assert!(matches!(err, PipelineError::Archive(ArchiveError::Write { .. })));
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );
    assert!(!layout.backup_archive_path().exists());
    assert_eq!(patch_state(&layout), PatchState::Pristine);
    assert!(!layout.lock_path().exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn failed_rollback_reports_both_errors() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);

    let err = patch_with_codec(&layout, &offline_options(), &BackupLosingCodec)
        .expect_err("repack failure must propagate");
    match &err {
        PipelineError::Rollback { cause, restore } => {
            assert!(matches!(cause, ArchiveError::Write { .. }));
            assert_eq!(restore.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected Rollback, got {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("disk full"), "unexpected message: {message}");
    assert!(
        message.contains("restoring the backup archive also failed"),
        "unexpected message: {message}"
    );
    assert!(!layout.working_archive_path().exists());
    assert!(!layout.backup_archive_path().exists());
    assert!(!layout.lock_path().exists(), "lock is released after a failed rollback");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unpatch_without_backup_is_not_patched_and_mutates_nothing() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);

    let err = unpatch(&layout).expect_err("pristine target must fail");
    assert!(matches!(err, PipelineError::NotPatched { .. }));
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );
    assert!(!layout.backup_archive_path().exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn patch_pristine_refuses_patched_target() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    patch_pristine(&layout, &offline_options()).expect("first patch on pristine target");

    let err = patch_pristine(&layout, &offline_options()).expect_err("second must fail");
    assert!(matches!(err, PipelineError::AlreadyPatched { .. }));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn concurrent_run_is_rejected_as_busy() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);

    let held = PipelineLock::acquire(&layout, "test").expect("must take lock");
    let err = patch(&layout, &offline_options()).expect_err("locked target must fail");
    match err {
        PipelineError::Busy { holder, .. } => {
            let holder = holder.expect("holder recorded");
            assert!(holder.contains("operation=test"), "unexpected holder: {holder}");
        }
        other => panic!("expected Busy, got {other}"),
    }
    let message = PipelineLock::acquire(&layout, "again")
        .expect_err("second claim must fail")
        .to_string();
    assert!(
        message.contains(&layout.lock_path().display().to_string())
            && message.contains("delete that file"),
        "unexpected message: {message}"
    );
    assert!(
        inspect(&layout).lock_holder.is_some(),
        "status reports the held lock"
    );
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );

    drop(held);
    assert!(!layout.lock_path().exists());
    patch(&layout, &offline_options()).expect("patch after release");

    let _ = fs::remove_dir_all(dir);
}

#[cfg(target_os = "linux")]
#[test]
fn lock_left_by_exited_process_is_reclaimed() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);
    // Above the kernel's pid_max, so never a live process.
    fs::write(
        layout.lock_path(),
        "pid=4294967 operation=patch started_at_unix=1\n",
    )
    .expect("must write stale lock");

    patch(&layout, &offline_options()).expect("stale lock must not block");
    assert!(!layout.lock_path().exists());
    unpatch(&layout).expect("must unpatch");
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn lock_without_readable_pid_stays_busy() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    fs::write(layout.lock_path(), "garbage\n").expect("must write lock");

    let err = unpatch(&layout).expect_err("unknown holder must block");
    assert!(matches!(err, PipelineError::Busy { .. }));
    assert!(layout.lock_path().exists());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn built_in_steps_rewrite_the_source_tree() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    let mut options = offline_options();
    options.keep_source_tree = true;
    options.features.dev_tools = true;

    let report = patch(&layout, &options).expect("must patch");
    assert!(report.source_tree_kept);
    assert_eq!(report.abandoned_count(), 0);
    assert_eq!(report.warning_count(), 0, "fixture carries every anchor");
    assert!(matches!(
        report.step("presence-dependency").expect("dependency step").outcome,
        StepOutcome::Applied { .. }
    ));
    assert!(matches!(
        report.step("tray-presence-toggle").expect("toggle step").outcome,
        StepOutcome::Applied { .. }
    ));
    assert_eq!(
        report.step("downloader").map(|step| &step.outcome),
        Some(&StepOutcome::Skipped)
    );

    let runtime = read_source(&layout, "discord/DiscordActivity.js");
    assert!(runtime.contains("class DiscordActivity"));

    let main_controller = read_source(&layout, "app/MainController.js");
    assert!(main_controller.contains(
        "var _electron = require(\"electron\");\nvar _DiscordActivity = _interopRequireDefault(require(\"../discord/DiscordActivity\"));"
    ));
    assert!(main_controller.contains("new _DiscordActivity.default('1004259730526584873'"));
    assert!(main_controller.contains(
        "new WindowController(this.userSettingsController, applicationDelegate, menuController)"
    ));

    let keys = read_source(&layout, "user/UserSettingsKeysEnum.js");
    assert!(keys.contains(r#"UserSettingsKeys["DISCORD_RPC_DISABLED"] = "discord.rpc.disabled";"#));

    let window = read_source(&layout, "window/WindowController.js");
    assert!(
        window.contains("constructor(userSettingsController, applicationDelegate, menuController)")
    );
    assert!(window.contains("this.userSettingsController = userSettingsController;"));
    assert!(window.contains("buildTrayMenu(isPlaying) {"));
    assert!(!window.contains("this.buildTrayMenu();"));
    assert_eq!(window.matches("this.buildTrayMenu(false);").count(), 2);
    assert!(window.contains("label: 'Discord Rich Presence'"));

    let menu = read_source(&layout, "menu/MenuController.js");
    assert!(!menu.contains("process.env.NODE_ENV"));
    let github_case = menu
        .find("case _MenuEventEnum.default.GITHUB_TEP:")
        .expect("help dispatch inserted");
    let support_case = menu
        .find("case _MenuEventEnum.default.SUPPORT:")
        .expect("support case kept");
    assert!(github_case < support_case, "help dispatch goes above the support case");

    let help = read_source(&layout, "menu/helpMenu.js");
    assert!(help.contains(
        "click: delegate.menuClick.bind(delegate)\n  }, {\nlabel: 'About TIDAL Enhanced'"
    ));

    let developer = read_source(&layout, "menu/developerMenu.js");
    assert!(developer.contains("SHOW_RENDERER_DEVTOOLS,\naccelerator: 'Ctrl+Shift+I',"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn gated_steps_are_skipped_and_reported_in_order() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    let mut options = offline_options();
    options.features.tray_menu = false;
    options.features.help_links = false;

    let mut observer = RecordingObserver::default();
    let report =
        patch_with_hooks(&layout, &options, &AsarCodec, &mut observer).expect("must patch");

    let names = report
        .steps
        .iter()
        .map(|step| step.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "presence-dependency",
            "presence-runtime",
            "presence-setting",
            "tray-menu",
            "tray-presence-toggle",
            "help-links",
            "dev-tools",
            "downloader",
        ]
    );
    for skipped in [
        "tray-menu",
        "tray-presence-toggle",
        "help-links",
        "dev-tools",
        "downloader",
    ] {
        assert_eq!(
            report.step(skipped).map(|step| &step.outcome),
            Some(&StepOutcome::Skipped),
            "{skipped} should be skipped"
        );
    }
    assert_eq!(observer.started, names);
    assert_eq!(observer.finished, names.len());
    assert_eq!(
        observer.stages,
        vec![
            PipelineStage::Extracting,
            PipelineStage::BackingUp,
            PipelineStage::Repacking,
            PipelineStage::RemovingSourceTree,
        ]
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_target_file_abandons_only_its_step() {
    let dir = test_dir();
    let (layout, _) = seed_target_with(&dir, |fixture| {
        fs::remove_file(fixture.join("app/main/menu/helpMenu.js")).expect("must drop help menu");
    });
    let mut options = offline_options();
    options.features.dev_tools = true;
    options.keep_source_tree = true;

    let report = patch(&layout, &options).expect("missing file is not fatal");
    match &report.step("help-links").expect("help step").outcome {
        StepOutcome::Abandoned { reason } => {
            assert!(reason.contains("helpMenu.js"), "unexpected reason: {reason}")
        }
        other => panic!("expected abandoned help step, got {other:?}"),
    }
    assert!(matches!(
        report.step("dev-tools").expect("dev step").outcome,
        StepOutcome::Applied { .. }
    ));
    assert!(!read_source(&layout, "menu/MenuController.js").contains("process.env.NODE_ENV"));
    assert_eq!(patch_state(&layout), PatchState::Patched);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn downloader_without_helper_is_abandoned_and_later_steps_run() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    let mut options = offline_options();
    options.features.downloader = true;
    options.keep_source_tree = true;
    options.recipes.push(Recipe {
        name: "marker".to_string(),
        description: None,
        files: vec![RecipeFile {
            path: "package.json".to_string(),
            modifications: vec![Modification::replace_all(
                Reference::literal("\"tidal\""),
                "\"tidal-enhanced\"",
            )],
        }],
    });

    let report = patch(&layout, &options).expect("must patch");
    match &report.step("downloader").expect("downloader step").outcome {
        StepOutcome::Abandoned { reason } => {
            assert!(reason.contains("was not found"), "unexpected reason: {reason}")
        }
        other => panic!("expected abandoned downloader, got {other:?}"),
    }
    assert!(!layout.main_dir().join("menu/downloadMenu.js").exists());
    assert!(matches!(
        report.step("recipe:marker").expect("recipe step").outcome,
        StepOutcome::Applied { .. }
    ));
    let package = fs::read_to_string(layout.source_tree_dir().join("package.json"))
        .expect("must read package.json");
    assert!(package.contains("\"tidal-enhanced\""));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn downloader_with_helper_wires_menu() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    let helper = dir.join("tidal-dl.exe");
    fs::write(&helper, b"MZ").expect("must write helper");

    let mut options = offline_options();
    options.features.downloader = true;
    options.downloader_helper = Some(helper);
    options.keep_source_tree = true;

    let report = patch(&layout, &options).expect("must patch");
    assert!(matches!(
        report.step("downloader").expect("downloader step").outcome,
        StepOutcome::Applied { .. }
    ));
    assert!(read_source(&layout, "menu/downloadMenu.js").contains("function downloadMenu"));
    let events = read_source(&layout, "menu/MenuEventEnum.js");
    assert!(events.contains("MenuEvent[\"OPEN_DL_GUI\"] = \"open.dl.gui\";"));

    let menu = read_source(&layout, "menu/MenuController.js");
    let splice = menu
        .find("template.splice(1, 0, (0, _downloadMenu.default)(this));")
        .expect("download menu spliced");
    let build = menu.find("const menu").expect("menu build kept");
    assert!(splice < build);
    let open_gui = menu
        .find("case _MenuEventEnum.default.OPEN_DL_GUI:")
        .expect("gui dispatch inserted");
    let about = menu
        .find("case _MenuEventEnum.default.NAVIGATE_ABOUT:")
        .expect("about case kept");
    assert!(open_gui < about);
    assert!(menu.contains("tidal-dl.exe"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_dependency_tool_abandons_everything_that_needs_the_package() {
    let dir = test_dir();
    let (layout, _) = seed_target_with(&dir, drop_presence_package);
    let mut options = PatchOptions::default();
    options.presence.npm_program = "enhancer-test-npm-that-does-not-exist".to_string();
    options.keep_source_tree = true;

    let report = patch(&layout, &options).expect("missing tool is not fatal");
    match &report.step("presence-dependency").expect("dependency step").outcome {
        StepOutcome::Abandoned { reason } => assert!(
            reason.contains("enhancer-test-npm-that-does-not-exist"),
            "unexpected reason: {reason}"
        ),
        other => panic!("expected abandoned dependency step, got {other:?}"),
    }
    for dependent in ["presence-runtime", "tray-presence-toggle"] {
        match &report.step(dependent).expect("dependent step").outcome {
            StepOutcome::Abandoned { reason } => {
                assert!(reason.contains("did not apply"), "unexpected reason: {reason}")
            }
            other => panic!("expected {dependent} to be abandoned, got {other:?}"),
        }
    }
    for independent in ["presence-setting", "tray-menu", "help-links"] {
        assert!(
            matches!(
                report.step(independent).expect("independent step").outcome,
                StepOutcome::Applied { .. }
            ),
            "{independent} should still apply"
        );
    }

    assert!(!layout.main_dir().join("discord").exists());
    let main_controller = read_source(&layout, "app/MainController.js");
    assert!(!main_controller.contains("DiscordActivity"));
    let window = read_source(&layout, "window/WindowController.js");
    assert!(window.contains("buildTrayMenu(isPlaying) {"));
    assert!(!window.contains("Discord Rich Presence"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn skipped_install_requires_package_already_in_tree() {
    let dir = test_dir();
    let (layout, _) = seed_target_with(&dir, drop_presence_package);
    let mut options = offline_options();
    options.keep_source_tree = true;

    let report = patch(&layout, &options).expect("missing package is not fatal");
    match &report.step("presence-dependency").expect("dependency step").outcome {
        StepOutcome::Abandoned { reason } => assert!(
            reason.contains("@xhayper/discord-rpc") && reason.contains("not installed"),
            "unexpected reason: {reason}"
        ),
        other => panic!("expected abandoned dependency step, got {other:?}"),
    }
    assert!(matches!(
        report.step("presence-runtime").expect("runtime step").outcome,
        StepOutcome::Abandoned { .. }
    ));
    assert!(!read_source(&layout, "app/MainController.js").contains("DiscordActivity"));

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn recipe_with_absent_anchor_reports_warning() {
    let dir = test_dir();
    let (layout, _) = seed_target(&dir);
    let mut options = offline_options();
    options.recipes.push(Recipe {
        name: "stale".to_string(),
        description: None,
        files: vec![RecipeFile {
            path: "app/main/app/MainController.js".to_string(),
            modifications: vec![Modification::after_line(
                Reference::literal("removedInNewerRelease"),
                "// never inserted",
            )],
        }],
    });

    let report = patch(&layout, &options).expect("must patch");
    match &report.step("recipe:stale").expect("recipe step").outcome {
        StepOutcome::Applied { warnings } => {
            assert_eq!(warnings.len(), 1);
            assert_eq!(warnings[0].reference, "`removedInNewerRelease`");
        }
        other => panic!("expected applied recipe, got {other:?}"),
    }
    assert_eq!(report.warning_count(), 1);

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn extract_only_leaves_archives_untouched() {
    let dir = test_dir();
    let (layout, original) = seed_target(&dir);

    let err = extract_only(&layout, true).expect_err("no backup to extract");
    assert!(matches!(err, PipelineError::NotPatched { .. }));

    let source = extract_only(&layout, false).expect("must extract working archive");
    assert_eq!(source, layout.source_tree_dir());
    assert_eq!(read_source(&layout, "app/MainController.js"), MAIN_CONTROLLER);
    assert_eq!(
        fs::read(layout.working_archive_path()).expect("must read working"),
        original
    );
    assert_eq!(patch_state(&layout), PatchState::Pristine);

    let status = inspect(&layout);
    assert!(status.working_archive_present);
    assert!(status.source_tree_present);
    assert!(status.lock_holder.is_none());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn execute_step_stops_at_first_failing_action() {
    let dir = test_dir();
    let step = InstallerStep {
        name: "partial".to_string(),
        enabled: true,
        requires: Vec::new(),
        actions: vec![
            StepAction::CreateDir {
                path: dir.join("made"),
            },
            StepAction::RequireTool {
                name: "helper".to_string(),
                path: None,
            },
            StepAction::CreateDir {
                path: dir.join("never"),
            },
        ],
    };

    let err = execute_step(&step, &dir).expect_err("missing tool must fail");
    assert!(matches!(err, StepError::ExternalToolMissing { .. }));
    assert!(dir.join("made").is_dir());
    assert!(!dir.join("never").exists());

    let _ = fs::remove_dir_all(dir);
}
