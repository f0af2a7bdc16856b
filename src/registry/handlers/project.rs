//! Project lifecycle executors: create, initialize and open an editor
//! project. The editor itself is started through a [`Launcher`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::AppError;
use crate::instruction::Instruction;
use crate::paths;
use crate::project::{atomic_write, ProjectRecord};
use crate::registry::params::ProjectParams;
use crate::registry::ExecutionOutcome;
use crate::state::ClientContext;

/// Package that lets the editor talk to the assistant.
pub const ADAPTER_PACKAGE: &str = "com.t2g.unityadapter";

/// Packages every initialized project depends on, besides the adapter.
const REQUIRED_PACKAGES: [(&str, &str); 2] = [
    ("com.unity.ugui", "2.0.0"),
    ("com.unity.editorcoroutines", "1.0.0"),
];

const EDITOR_START_TIMEOUT: Duration = Duration::from_secs(60);
const PEER_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
const PEER_WAIT_POLL: Duration = Duration::from_secs(1);

// ── Launcher ────────────────────────────────────────────────────

/// Starts editor processes.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Run to completion and return the exit code.
    async fn run(&self, program: &Path, args: &[String]) -> Result<i32, AppError>;
    /// Start without waiting for the process to exit.
    async fn spawn(&self, program: &Path, args: &[String]) -> Result<(), AppError>;
}

/// Launches real processes through `tokio::process`.
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn run(&self, program: &Path, args: &[String]) -> Result<i32, AppError> {
        tracing::info!(program = %program.display(), ?args, "running editor");
        let status = tokio::process::Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| AppError::Execution {
                message: format!("Failed to run {}: {e}", program.display()),
            })?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn spawn(&self, program: &Path, args: &[String]) -> Result<(), AppError> {
        tracing::info!(program = %program.display(), ?args, "starting editor");
        tokio::process::Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|e| AppError::Execution {
                message: format!("Failed to start {}: {e}", program.display()),
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn editor_path(ctx: &ClientContext, purpose: &str) -> Result<PathBuf, ExecutionOutcome> {
    match ctx.with_settings(|s| s.editor_path.clone()) {
        Some(path) if path.is_file() => Ok(path),
        _ => Err(ExecutionOutcome::failed(format!(
            "Please set up the editor path before {purpose}."
        ))),
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

// ── Executors ───────────────────────────────────────────────────

/// Create a fresh project in batch mode. On a clean exit an `init_project`
/// follow-up is spliced in right after this instruction.
pub async fn create_project(
    ctx: &ClientContext,
    instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    let editor = match editor_path(ctx, "creating a new project") {
        Ok(path) => path,
        Err(outcome) => return Ok(outcome),
    };
    if ctx.with_settings(|s| s.plugin_path.is_none()) {
        return Ok(ExecutionOutcome::failed(
            "Please set up the plugin path before creating a new project.",
        ));
    }

    let params = ProjectParams::from_instruction(instruction);
    if params.path.is_empty() || params.project_name.is_empty() {
        return Ok(ExecutionOutcome::failed(
            "A project path and name are required.",
        ));
    }
    let record = ProjectRecord::new(&params.project_name, &params.path);
    let root = record.root();

    if root.exists() {
        tokio::fs::remove_dir_all(&root).await?;
    }
    tokio::fs::create_dir_all(&params.path).await?;

    let args = vec![
        "-batchMode".to_string(),
        "-createproject".to_string(),
        path_arg(&root),
        "-quit".to_string(),
    ];
    let code = ctx.launcher.run(&editor, &args).await?;
    if let Err(e) = ctx.projects.remember(&record) {
        tracing::warn!(error = %e, "failed to remember project");
    }

    if code != 0 {
        return Ok(ExecutionOutcome::failed(format!("Failed! Exit Code: {code}")));
    }
    Ok(
        ExecutionOutcome::succeeded(format!("Project {} was created!", root.display()))
            .with_follow_up(params.to_instruction("init_project")),
    )
}

/// Register the adapter and its companion packages in
/// `Packages/manifest.json`. Existing entries are left alone.
pub async fn init_project(
    ctx: &ClientContext,
    instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    if let Err(outcome) = editor_path(ctx, "initializing a project") {
        return Ok(outcome);
    }
    let plugin = ctx
        .with_settings(|s| s.plugin_path.clone())
        .filter(|p| p.to_string_lossy().contains(ADAPTER_PACKAGE));
    let Some(plugin) = plugin else {
        return Ok(ExecutionOutcome::failed(
            "Please set up the plugin path before initializing a project.",
        ));
    };

    let params = ProjectParams::from_instruction(instruction);
    let root = Path::new(&params.path).join(&params.project_name);
    if params.project_name.is_empty() || !root.is_dir() {
        return Ok(ExecutionOutcome::failed("Project was not found!"));
    }

    let manifest = paths::package_manifest_path(&root);
    let Ok(text) = tokio::fs::read_to_string(&manifest).await else {
        return Ok(ExecutionOutcome::failed(
            "Failed to open the manifest.json file for project initialization!",
        ));
    };
    let merged = merge_dependencies(&text, &format!("file:{}", plugin.display()))?;
    atomic_write(&manifest, merged.as_bytes())?;
    Ok(ExecutionOutcome::succeeded("Project has been initialized!"))
}

/// Add the required dependencies to a manifest document, keeping key order.
pub fn merge_dependencies(manifest: &str, adapter_source: &str) -> Result<String, AppError> {
    let mut doc: IndexMap<String, Value> =
        serde_json::from_str(manifest).map_err(|e| AppError::Execution {
            message: format!("Invalid manifest.json: {e}"),
        })?;
    let mut deps: IndexMap<String, Value> = match doc.get("dependencies") {
        Some(Value::Object(map)) => map.clone().into_iter().collect(),
        _ => IndexMap::new(),
    };
    deps.entry(ADAPTER_PACKAGE.to_string())
        .or_insert_with(|| Value::from(adapter_source));
    for (name, version) in REQUIRED_PACKAGES {
        deps.entry(name.to_string())
            .or_insert_with(|| Value::from(version));
    }
    doc.insert("dependencies".to_string(), serde_json::to_value(deps)?);
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Launch the editor on a project and wait for it to connect back. An empty
/// path looks the project up among remembered ones.
pub async fn open_project(
    ctx: &ClientContext,
    instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    let editor = match editor_path(ctx, "opening a project") {
        Ok(path) => path,
        Err(outcome) => return Ok(outcome),
    };

    let params = ProjectParams::from_instruction(instruction);
    let record = if params.path.is_empty() {
        ctx.projects.find(&params.project_name)
    } else {
        Some(ProjectRecord::new(&params.project_name, &params.path))
    };
    let Some(record) = record.filter(|r| r.root().is_dir()) else {
        let shown = Path::new(&params.path).join(&params.project_name);
        return Ok(ExecutionOutcome::failed(format!(
            "Project {} was not found.",
            shown.display()
        )));
    };

    let args = vec!["-projectPath".to_string(), path_arg(&record.root())];
    match tokio::time::timeout(EDITOR_START_TIMEOUT, ctx.launcher.spawn(&editor, &args)).await {
        Ok(result) => result?,
        Err(_) => {
            return Ok(ExecutionOutcome::failed(
                "Timeout waiting for the editor to start.",
            ))
        }
    }

    if !wait_for_peer(ctx, PEER_WAIT_TIMEOUT).await {
        return Ok(ExecutionOutcome::failed("Failed to open the project!"));
    }
    if let Err(e) = ctx.projects.remember(&record) {
        tracing::warn!(error = %e, "failed to remember project");
    }
    ctx.set_current_project(record);
    Ok(ExecutionOutcome::succeeded("Project is opened!"))
}

/// Keep trying to connect until the peer answers or `limit` elapses.
async fn wait_for_peer(ctx: &ClientContext, limit: Duration) -> bool {
    let attempt = async {
        while !ctx.transport.is_connected() {
            if ctx.cancel.is_cancelled() {
                return false;
            }
            ctx.transport.connect(&ctx.cancel).await;
            if !ctx.transport.is_connected() {
                tokio::time::sleep(PEER_WAIT_POLL).await;
            }
        }
        true
    };
    tokio::time::timeout(limit, attempt).await.unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::instruction::InstructionState;
    use crate::testing::{self, FakeLauncher};
    use crate::transport::memory;

    fn configured(dir: &Path, launcher: FakeLauncher) -> (ClientContext, memory::MemoryAcceptor) {
        let editor = dir.join("editor.exe");
        fs::write(&editor, "").unwrap();
        let (connector, acceptor) = memory::listener();
        let ctx = testing::client_context_with(dir, connector, launcher);
        ctx.with_settings_mut(|s| {
            s.editor_path = Some(editor);
            s.plugin_path = Some(dir.join("plugins").join(ADAPTER_PACKAGE));
        });
        (ctx, acceptor)
    }

    #[tokio::test]
    async fn missing_editor_path_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let (connector, _acceptor) = memory::listener();
        let ctx = testing::client_context(dir.path(), connector);
        let ins = ProjectParams {
            path: dir.path().display().to_string(),
            project_name: "Maze".into(),
        }
        .to_instruction("create_project");

        let out = create_project(&ctx, &ins).await.unwrap();
        assert!(!out.succeeded);
        assert!(out.message.unwrap().contains("editor path"));
    }

    #[tokio::test]
    async fn create_splices_init_follow_up() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::exiting_with(0);
        let (ctx, _acceptor) = configured(dir.path(), launcher.clone());
        let games = dir.path().join("games");
        let ins = ProjectParams {
            path: games.display().to_string(),
            project_name: "Maze".into(),
        }
        .to_instruction("create_project");

        let out = create_project(&ctx, &ins).await.unwrap();
        assert!(out.succeeded, "{out:?}");
        assert_eq!(out.additional.len(), 1);
        let follow = &out.additional[0];
        assert_eq!(follow.action, "init_project");
        assert_eq!(follow.state, InstructionState::Local);
        assert_eq!(follow.param("projectName").as_str_or(""), "Maze");

        let runs = launcher.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0][0], "-batchMode");
        assert_eq!(runs[0][2], games.join("Maze").display().to_string());
        assert!(ctx.projects.find("maze").is_some());
    }

    #[tokio::test]
    async fn create_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _acceptor) = configured(dir.path(), FakeLauncher::exiting_with(3));
        let ins = ProjectParams {
            path: dir.path().join("games").display().to_string(),
            project_name: "Maze".into(),
        }
        .to_instruction("create_project");

        let out = create_project(&ctx, &ins).await.unwrap();
        assert_eq!(out, ExecutionOutcome::failed("Failed! Exit Code: 3"));
    }

    #[tokio::test]
    async fn init_merges_manifest_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _acceptor) = configured(dir.path(), FakeLauncher::exiting_with(0));
        let root = dir.path().join("games").join("Maze");
        fs::create_dir_all(root.join("Packages")).unwrap();
        fs::write(
            paths::package_manifest_path(&root),
            r#"{"dependencies":{"com.unity.ugui":"1.0.0"},"scopedRegistries":[]}"#,
        )
        .unwrap();
        let ins = ProjectParams {
            path: dir.path().join("games").display().to_string(),
            project_name: "Maze".into(),
        }
        .to_instruction("init_project");

        let out = init_project(&ctx, &ins).await.unwrap();
        assert_eq!(out, ExecutionOutcome::succeeded("Project has been initialized!"));

        let written: Value =
            serde_json::from_str(&fs::read_to_string(paths::package_manifest_path(&root)).unwrap())
                .unwrap();
        let deps = &written["dependencies"];
        assert_eq!(deps["com.unity.ugui"], "1.0.0");
        assert_eq!(deps["com.unity.editorcoroutines"], "1.0.0");
        assert!(deps[ADAPTER_PACKAGE].as_str().unwrap().starts_with("file:"));
        assert_eq!(written["scopedRegistries"], json!([]));
    }

    #[tokio::test]
    async fn init_without_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _acceptor) = configured(dir.path(), FakeLauncher::exiting_with(0));
        fs::create_dir_all(dir.path().join("games").join("Maze")).unwrap();
        let ins = ProjectParams {
            path: dir.path().join("games").display().to_string(),
            project_name: "Maze".into(),
        }
        .to_instruction("init_project");

        let out = init_project(&ctx, &ins).await.unwrap();
        assert!(!out.succeeded);
        assert!(out.message.unwrap().contains("manifest.json"));
    }

    #[test]
    fn merge_keeps_existing_entries_and_order() {
        let merged = merge_dependencies(
            r#"{"name":"x","dependencies":{"a":"1"}}"#,
            "file:/plugins/com.t2g.unityadapter",
        )
        .unwrap();
        let doc: IndexMap<String, Value> = serde_json::from_str(&merged).unwrap();
        assert_eq!(doc.keys().next().map(String::as_str), Some("name"));
        let deps = doc["dependencies"].as_object().unwrap();
        assert_eq!(deps["a"], "1");
        assert_eq!(deps.len(), 4);
        assert!(merge_dependencies("[1]", "file:x").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn open_uses_remembered_project_and_waits_for_peer() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = FakeLauncher::exiting_with(0);
        let (ctx, _acceptor) = configured(dir.path(), launcher.clone());
        let record = ProjectRecord::new("Maze", dir.path().join("games").display().to_string());
        fs::create_dir_all(record.root()).unwrap();
        ctx.projects.remember(&record).unwrap();

        let ins = Instruction::local("open_project")
            .with_param("path", "")
            .with_param("projectName", "maze");
        let out = open_project(&ctx, &ins).await.unwrap();
        assert_eq!(out, ExecutionOutcome::succeeded("Project is opened!"));
        assert_eq!(launcher.spawns()[0][1], record.root().display().to_string());
        assert_eq!(ctx.current_project(), Some(record));
    }

    #[tokio::test(start_paused = true)]
    async fn open_unknown_project_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _acceptor) = configured(dir.path(), FakeLauncher::exiting_with(0));
        let ins = Instruction::local("open_project").with_param("projectName", "Nowhere");
        let out = open_project(&ctx, &ins).await.unwrap();
        assert!(!out.succeeded);
        assert!(out.message.unwrap().ends_with("was not found."));
    }

    #[tokio::test(start_paused = true)]
    async fn open_times_out_without_peer() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, acceptor) = configured(dir.path(), FakeLauncher::exiting_with(0));
        drop(acceptor);
        let record = ProjectRecord::new("Maze", dir.path().display().to_string());
        fs::create_dir_all(record.root()).unwrap();
        let ins = Instruction::local("open_project")
            .with_param("path", record.project_path.clone())
            .with_param("projectName", "Maze");

        let out = open_project(&ctx, &ins).await.unwrap();
        assert_eq!(out, ExecutionOutcome::failed("Failed to open the project!"));
        assert_eq!(ctx.current_project(), None);
    }
}
