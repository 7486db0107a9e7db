use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use enhancer_core::{apply_modifications, MissingReference, Modification, Recipe, Reference};
use tracing::{debug, warn};

use crate::error::StepError;
use crate::layout::TargetLayout;
use crate::options::PatchOptions;

const PRESENCE_RUNTIME: &str = include_str!("../assets/DiscordActivity.js");
const DOWNLOAD_MENU: &str = include_str!("../assets/downloadMenu.js");

const TRAY_PLAYBACK_ITEMS: &str = r#"label: isPlaying ? bundle.data['t-pause'] : bundle.data['t-play'],
        click: () => (isPlaying ? playbackActions.pause() : playbackActions.resume()),
      }, {
        label: bundle.data['t-previous'],
        click: () => playbackActions.playPrevious(),
      }, {
        label: bundle.data['t-next'],
        click: () => playbackActions.playNext(),
      }, {
        type: 'separator',
      }, {"#;

const TRAY_PRESENCE_TOGGLE: &str = r#"label: 'Discord Rich Presence',
        type: 'checkbox',
        checked: !this.userSettingsController.get(_UserSettingsKeysEnum.default.DISCORD_RPC_DISABLED),
        click: () => {
          const key = _UserSettingsKeysEnum.default.DISCORD_RPC_DISABLED;
          this.userSettingsController.set(key, !this.userSettingsController.get(key));
        },
      }, {"#;

const HELP_MENU_ITEMS: &str = r#"label: 'About TIDAL Enhanced',
        id: _MenuEventEnum.default.GITHUB_TEP,
        enabled: true,
        type: 'normal',
        click: delegate.menuClick.bind(delegate),
      }, {
        label: 'About TIDAL Media Downloader',
        id: _MenuEventEnum.default.GITHUB_TDL,
        enabled: true,
        type: 'normal',
        click: delegate.menuClick.bind(delegate),
      }, {"#;

const HELP_MENU_DISPATCH: &str = r#"case _MenuEventEnum.default.GITHUB_TEP:
        _electron.shell.openExternal('https://github.com/nekusu/tidal-enhanced-patcher');
        break;
      case _MenuEventEnum.default.GITHUB_TDL:
        _electron.shell.openExternal('https://github.com/yaronzz/Tidal-Media-Downloader');
        break;"#;

/// One unit of work against the extracted source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    CreateDir {
        path: PathBuf,
    },
    WriteFile {
        path: PathBuf,
        contents: String,
    },
    Modify {
        file: PathBuf,
        modifications: Vec<Modification>,
    },
    /// Runs `program` with the source tree as working directory.
    RunTool {
        program: String,
        args: Vec<String>,
    },
    /// Fails the step unless `path` names an existing file.
    RequireTool {
        name: String,
        path: Option<PathBuf>,
    },
    /// Fails the step unless the npm package is installed at `path`.
    RequirePackage {
        package: String,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerStep {
    pub name: String,
    pub enabled: bool,
    /// Earlier steps that must have applied; otherwise this one is abandoned.
    pub requires: Vec<String>,
    pub actions: Vec<StepAction>,
}

impl InstallerStep {
    fn new(name: impl Into<String>, enabled: bool, actions: Vec<StepAction>) -> Self {
        Self {
            name: name.into(),
            enabled,
            requires: Vec::new(),
            actions,
        }
    }

    fn requires(mut self, steps: &[&str]) -> Self {
        self.requires = steps.iter().map(|step| step.to_string()).collect();
        self
    }
}

/// Built-in steps in their fixed order, followed by one step per recipe.
pub fn installer_steps(layout: &TargetLayout, options: &PatchOptions) -> Vec<InstallerStep> {
    let main = layout.main_dir();
    let features = &options.features;

    let mut steps = vec![
        presence_dependency_step(&layout.source_tree_dir(), options),
        presence_runtime_step(&main, &options.presence.client_id)
            .requires(&["presence-dependency"]),
        presence_setting_step(&main),
        InstallerStep::new("tray-menu", features.tray_menu, tray_menu_actions(&main)),
        tray_presence_toggle_step(&main, features.tray_menu).requires(&[
            "presence-runtime",
            "presence-setting",
            "tray-menu",
        ]),
        InstallerStep::new("help-links", features.help_links, help_links_actions(&main)),
        InstallerStep::new("dev-tools", features.dev_tools, dev_tools_actions(&main)),
        downloader_step(&main, options),
    ];
    steps.extend(
        options
            .recipes
            .iter()
            .map(|recipe| recipe_step(&layout.source_tree_dir(), recipe)),
    );
    steps
}

fn modify(file: PathBuf, modifications: Vec<Modification>) -> StepAction {
    StepAction::Modify {
        file,
        modifications,
    }
}

fn after(anchor: &str, payload: impl Into<String>) -> Modification {
    Modification::after_line(Reference::literal(anchor), payload)
}

/// Installs the presence client package, or only checks for it when
/// installation is turned off.
fn presence_dependency_step(source_tree: &Path, options: &PatchOptions) -> InstallerStep {
    let presence = &options.presence;
    let mut actions = Vec::new();
    if presence.install_dependency {
        actions.push(StepAction::RunTool {
            program: presence.npm_program.clone(),
            args: vec!["install".to_string(), presence.package.clone()],
        });
    }
    actions.push(StepAction::RequirePackage {
        package: presence.package.clone(),
        path: package_dir(source_tree, &presence.package),
    });
    InstallerStep::new("presence-dependency", true, actions)
}

fn package_dir(source_tree: &Path, package: &str) -> PathBuf {
    package
        .split('/')
        .fold(source_tree.join("node_modules"), |dir, part| dir.join(part))
}

fn presence_runtime_step(main: &Path, client_id: &str) -> InstallerStep {
    let constructor = format!(
        "this.discordActivity = new _DiscordActivity.default('{client_id}', this.userSettingsController, playbackStatusController);"
    );
    InstallerStep::new(
        "presence-runtime",
        true,
        vec![
            StepAction::CreateDir {
                path: main.join("discord"),
            },
            StepAction::WriteFile {
                path: main.join("discord").join("DiscordActivity.js"),
                contents: PRESENCE_RUNTIME.to_string(),
            },
            modify(
                main.join("app").join("MainController.js"),
                vec![
                    after(
                        "var _electron",
                        r#"var _DiscordActivity = _interopRequireDefault(require("../discord/DiscordActivity"));"#,
                    ),
                    after("let autoStartDelegate", constructor),
                ],
            ),
        ],
    )
}

fn presence_setting_step(main: &Path) -> InstallerStep {
    let user = main.join("user");
    InstallerStep::new(
        "presence-setting",
        true,
        vec![
            modify(
                user.join("UserSettingsKeysEnum.js"),
                vec![after(
                    r#"UserSettingsKeys["CLOSE_TO_TRAY"]"#,
                    r#"UserSettingsKeys["DISCORD_RPC_DISABLED"] = "discord.rpc.disabled";"#,
                )],
            ),
            modify(
                user.join("UserSettingsController.js"),
                vec![
                    after(
                        "[_UserSettingsKeysEnum.default.CLOSE_TO_TRAY]",
                        "[_UserSettingsKeysEnum.default.DISCORD_RPC_DISABLED]: false,",
                    ),
                    after(
                        "closeToTray:",
                        "discordRpcDisabled: _UserSettingsKeysEnum.default.DISCORD_RPC_DISABLED,",
                    ),
                ],
            ),
        ],
    )
}

fn tray_menu_actions(main: &Path) -> Vec<StepAction> {
    vec![
        modify(
            main.join("app").join("MainController.js"),
            vec![Modification::at_offset(
                Reference::literal("applicationDelegate, menuController"),
                "this.userSettingsController, ",
            )],
        ),
        modify(
            main.join("window").join("WindowController.js"),
            vec![
                after(
                    "var _electron",
                    r#"var _UserSettingsKeysEnum = _interopRequireDefault(require("../user/UserSettingsKeysEnum"));"#,
                ),
                Modification::at_offset(
                    Reference::literal("applicationDelegate, menuController"),
                    "userSettingsController, ",
                ),
                after(
                    "this.applicationDelegate =",
                    "this.userSettingsController = userSettingsController;",
                ),
                after(
                    "this.setThumbBarButtons(!!isPlaying);",
                    "this.buildTrayMenu(!!isPlaying);",
                ),
                Modification::replace_all(
                    Reference::literal("this.buildTrayMenu();"),
                    "this.buildTrayMenu(false);",
                ),
                Modification::replace_all(
                    Reference::literal("buildTrayMenu() {"),
                    "buildTrayMenu(isPlaying) {",
                ),
                after(
                    "const contextMenu = _electron.Menu.buildFromTemplate",
                    TRAY_PLAYBACK_ITEMS,
                ),
            ],
        ),
    ]
}

fn tray_presence_toggle_step(main: &Path, enabled: bool) -> InstallerStep {
    InstallerStep::new(
        "tray-presence-toggle",
        enabled,
        vec![modify(
            main.join("window").join("WindowController.js"),
            vec![after(
                "const contextMenu = _electron.Menu.buildFromTemplate",
                TRAY_PRESENCE_TOGGLE,
            )],
        )],
    )
}

fn help_links_actions(main: &Path) -> Vec<StepAction> {
    let menu = main.join("menu");
    vec![
        modify(
            menu.join("MenuEventEnum.js"),
            vec![after(
                r#"MenuEvent["SUPPORT"]"#,
                "MenuEvent[\"GITHUB_TEP\"] = \"github.tep\";\nMenuEvent[\"GITHUB_TDL\"] = \"github.tdl\";",
            )],
        ),
        modify(
            menu.join("helpMenu.js"),
            vec![
                after("label: settings.locale.data['t-about']", HELP_MENU_ITEMS)
                    .with_line_offset(2),
            ],
        ),
        modify(
            menu.join("MenuController.js"),
            vec![
                after("case _MenuEventEnum.default.SUPPORT:", HELP_MENU_DISPATCH)
                    .with_line_offset(-1),
            ],
        ),
    ]
}

fn dev_tools_actions(main: &Path) -> Vec<StepAction> {
    let menu = main.join("menu");
    vec![
        modify(
            menu.join("developerMenu.js"),
            vec![after(
                "id: _MenuEventEnum.default.SHOW_RENDERER_DEVTOOLS",
                "accelerator: 'Ctrl+Shift+I',",
            )],
        ),
        modify(
            menu.join("MenuController.js"),
            vec![Modification::replace_all(
                Reference::literal("process.env.NODE_ENV === 'development'"),
                "true",
            )],
        ),
    ]
}

fn downloader_step(main: &Path, options: &PatchOptions) -> InstallerStep {
    let menu = main.join("menu");
    let helper = options
        .downloader_helper
        .as_deref()
        .map(|path| js_string_literal(&path.to_string_lossy()))
        .unwrap_or_else(|| "''".to_string());
    let dispatch = format!(
        "case _MenuEventEnum.default.OPEN_DL_GUI:\n        child_process.execFile({helper}, ['-g']);\n        break;\n      case _MenuEventEnum.default.OPEN_DL_CLI:\n        child_process.exec('start \"\" cmd /c \"' + {helper} + '\"');\n        break;"
    );

    InstallerStep::new(
        "downloader",
        options.features.downloader,
        vec![
            StepAction::RequireTool {
                name: "downloader helper".to_string(),
                path: options.downloader_helper.clone(),
            },
            StepAction::WriteFile {
                path: menu.join("downloadMenu.js"),
                contents: DOWNLOAD_MENU.to_string(),
            },
            modify(
                menu.join("MenuEventEnum.js"),
                vec![after(
                    r#"MenuEvent["NAVIGATION"]"#,
                    "MenuEvent[\"DOWNLOAD\"] = \"download\";\nMenuEvent[\"OPEN_DL_GUI\"] = \"open.dl.gui\";\nMenuEvent[\"OPEN_DL_CLI\"] = \"open.dl.cli\";",
                )],
            ),
            modify(
                menu.join("MenuController.js"),
                vec![
                    after(
                        "var _electron",
                        "var child_process = _interopRequireWildcard(require(\"child_process\"));\nvar _downloadMenu = _interopRequireDefault(require(\"./downloadMenu\"));",
                    ),
                    after(
                        "const menu",
                        "template.splice(1, 0, (0, _downloadMenu.default)(this));",
                    )
                    .with_line_offset(-1),
                    after("case _MenuEventEnum.default.NAVIGATE_ABOUT:", dispatch)
                        .with_line_offset(-2),
                ],
            ),
        ],
    )
}

fn recipe_step(source_tree: &Path, recipe: &Recipe) -> InstallerStep {
    let actions = recipe
        .files
        .iter()
        .map(|file| modify(source_tree.join(&file.path), file.modifications.clone()))
        .collect();
    InstallerStep::new(format!("recipe:{}", recipe.name), true, actions)
}

fn js_string_literal(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('\'');
    for ch in value.chars() {
        match ch {
            '\\' => literal.push_str("\\\\"),
            '\'' => literal.push_str("\\'"),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            other => literal.push(other),
        }
    }
    literal.push('\'');
    literal
}

/// Runs every action of `step` in order; the first failure abandons the rest.
pub fn execute_step(
    step: &InstallerStep,
    source_tree: &Path,
) -> Result<Vec<MissingReference>, StepError> {
    let mut warnings = Vec::new();
    for action in &step.actions {
        match action {
            StepAction::CreateDir { path } => {
                fs::create_dir_all(path).map_err(|source| StepError::Io {
                    action: "create directory",
                    path: path.clone(),
                    source,
                })?;
            }
            StepAction::WriteFile { path, contents } => {
                fs::write(path, contents).map_err(|source| StepError::Io {
                    action: "write",
                    path: path.clone(),
                    source,
                })?;
            }
            StepAction::Modify {
                file,
                modifications,
            } => {
                let outcome = apply_modifications(file, modifications)?;
                debug!(
                    step = step.name.as_str(),
                    file = %file.display(),
                    applied = outcome.applied,
                    "modifications applied"
                );
                warnings.extend(outcome.missing);
            }
            StepAction::RunTool { program, args } => run_tool(program, args, source_tree)?,
            StepAction::RequirePackage { package, path } => {
                if !path.is_dir() {
                    return Err(StepError::PackageMissing {
                        package: package.clone(),
                        path: path.clone(),
                    });
                }
            }
            StepAction::RequireTool { name, path } => {
                let present = path.as_deref().is_some_and(Path::is_file);
                if !present {
                    let tool = match path {
                        Some(path) => format!("{name} at {}", path.display()),
                        None => format!("{name} (no path configured)"),
                    };
                    return Err(StepError::ExternalToolMissing { tool });
                }
            }
        }
    }
    Ok(warnings)
}

fn run_tool(program: &str, args: &[String], cwd: &Path) -> Result<(), StepError> {
    let output = match Command::new(program).args(args).current_dir(cwd).output() {
        Ok(output) => output,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(StepError::ExternalToolMissing {
                tool: program.to_string(),
            });
        }
        Err(source) => {
            return Err(StepError::Io {
                action: "run",
                path: PathBuf::from(program),
                source,
            });
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(StepError::ToolFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    if !stderr.trim().is_empty() {
        warn!(program, stderr = stderr.trim(), "external tool reported warnings");
    }
    Ok(())
}
