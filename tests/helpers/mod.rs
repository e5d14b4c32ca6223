use std::fs;
use std::process::ExitStatus;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use spoon_snapshot::SnapshotError;
use spoon_snapshot::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use spoon_snapshot::image::ImageId;
use spoon_snapshot::registry::ImageRegistry;
use spoon_snapshot::scheduled_task::TaskRunner;
use spoon_snapshot::settings::{InstallScriptSettings, StartupFileSettings};
use spoon_snapshot::snapshot::{BuildContext, SnapshotJob};
use tempfile::TempDir;

/// Converts a process exit code into an `ExitStatus`.
#[allow(dead_code)]
#[cfg(unix)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    ExitStatus::from_raw(code << 8)
}

/// Converts a process exit code into an `ExitStatus`.
#[allow(dead_code)]
#[cfg(windows)]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    ExitStatus::from_raw(code as u32)
}

/// Returns the UTF-8 path of a temporary directory.
#[allow(dead_code)]
pub fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir should be UTF-8")
}

/// A task runner that records every task and fails tasks whose name
/// contains one of `fail_labels`.
#[derive(Default)]
#[allow(dead_code)]
pub struct RecordingTaskRunner {
    pub calls: Mutex<Vec<(String, String)>>,
    pub fail_labels: Vec<&'static str>,
}

#[allow(dead_code)]
impl RecordingTaskRunner {
    pub fn failing(labels: &[&'static str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_labels: labels.to_vec(),
        }
    }

    pub fn task_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl TaskRunner for RecordingTaskRunner {
    fn run(
        &self,
        task_name: &str,
        command_line: &str,
        working_dir: &Utf8Path,
    ) -> Result<(), SnapshotError> {
        assert!(working_dir.join("Vagrantfile").exists(), "Vagrantfile should be prepared");
        self.calls
            .lock()
            .unwrap()
            .push((task_name.to_string(), command_line.to_string()));

        if self.fail_labels.iter().any(|label| task_name.contains(label)) {
            return Err(SnapshotError::Task {
                task: task_name.to_string(),
                status: "exit code 1".to_string(),
            });
        }
        Ok(())
    }
}

/// A registry with a fixed answer that records the images it was asked about.
#[allow(dead_code)]
pub struct StaticRegistry {
    pub available: bool,
    pub unreachable: bool,
    pub queries: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl StaticRegistry {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            unreachable: false,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// A registry whose every query fails.
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(false)
        }
    }
}

impl ImageRegistry for StaticRegistry {
    fn is_available_remotely(&self, image: &ImageId) -> anyhow::Result<bool> {
        self.queries.lock().unwrap().push(image.to_string());
        if self.unreachable {
            anyhow::bail!("hub is unreachable");
        }
        Ok(self.available)
    }
}

/// An executor that records calls and returns scripted exit codes and
/// stdout in order. Once the script is exhausted every call succeeds with
/// empty output.
#[derive(Default)]
#[allow(dead_code)]
pub struct ScriptedExecutor {
    pub calls: Mutex<Vec<CommandSpec>>,
    pub responses: Vec<(i32, &'static str)>,
    pub next: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new(responses: Vec<(i32, &'static str)>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responses,
            next: AtomicUsize::new(0),
        }
    }

    pub fn commands(&self) -> Vec<(String, Vec<String>)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|spec| (spec.command.clone(), spec.args.clone()))
            .collect()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        self.calls.lock().unwrap().push(spec.clone());
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let (code, stdout) = self.responses.get(index).copied().unwrap_or((0, ""));
        Ok(ExecutionResult {
            status: Some(exit_status(code)),
            stdout: stdout.to_string(),
        })
    }
}

/// Fixture for one snapshot run: a workspace holding an installer and a
/// host directory with the studio tool and the VM work root.
#[allow(dead_code)]
pub struct Fixture {
    pub workspace: TempDir,
    pub host: TempDir,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new() -> Self {
        let workspace = tempfile::tempdir().expect("workspace");
        let host = tempfile::tempdir().expect("host dir");

        let installer = workspace.path().join("installer");
        fs::create_dir_all(&installer).expect("installer dir");
        fs::write(installer.join("install.exe"), b"MZ installer").expect("installer");

        fs::write(host.path().join("XStudio.exe"), b"MZ studio").expect("studio");
        fs::create_dir_all(host.path().join("work")).expect("work root");

        Self { workspace, host }
    }

    pub fn write_marker(&self, image: &str) {
        fs::write(self.workspace.path().join("image.txt"), format!("{}\n", image))
            .expect("marker file");
    }

    pub fn context(&self, project: &str) -> BuildContext {
        BuildContext {
            project_name: project.to_string(),
            workspace: utf8(&self.workspace),
            current_result: None,
            keep_workspace: false,
        }
    }

    pub fn job(&self, overwrite: bool) -> SnapshotJob {
        let host = utf8(&self.host);
        SnapshotJob {
            vagrant_box: "opentable/win-2012r2-standard-amd64-nocm".to_string(),
            studio_path: host.join("XStudio.exe"),
            studio_license_path: None,
            turbo_path: "turbo".to_string(),
            overwrite,
            install_script: InstallScriptSettings::default(),
            startup_file: StartupFileSettings::default(),
            work_root: Some(host.join("work")),
        }
    }

    pub fn work_root_entries(&self) -> usize {
        fs::read_dir(self.host.path().join("work"))
            .expect("work root")
            .count()
    }

    pub fn workspace_entries(&self) -> usize {
        fs::read_dir(self.workspace.path()).expect("workspace").count()
    }
}
