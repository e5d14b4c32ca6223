//! The snapshot workflow: provision a VM, capture its image, import it and
//! always tear the VM down again.
//!
//! [`perform`] takes everything it needs as parameters. The job settings,
//! the build context and the external collaborators are separate values so
//! a run has no state besides what is passed in.

use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::command::{ImportCommand, VagrantCommand};
use crate::environment::{INSTALL_DIRECTORY, INSTALLER_EXE_FILE, VagrantEnvironment};
use crate::error::{SnapshotError, error_chain};
use crate::executor::CommandExecutor;
use crate::image::{ImageId, load_import_target};
use crate::registry::ImageRegistry;
use crate::scheduled_task::TaskRunner;
use crate::settings::{InstallScriptSettings, StartupFileSettings};

/// Format of the image produced by the studio build.
const IMAGE_TYPE: &str = "svm";

static NON_WORD_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("valid regex"));

/// Result of the enclosing build so far, from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
}

impl BuildResult {
    pub fn is_worse_than(self, other: BuildResult) -> bool {
        self > other
    }
}

/// What the host build knows about this run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Project name, used for task names and the working directory prefix.
    pub project_name: String,
    /// Build workspace holding the installer and the image marker file.
    pub workspace: Utf8PathBuf,
    /// Result recorded by earlier build steps, if any.
    pub current_result: Option<BuildResult>,
    /// Leaves the workspace contents in place after the run. Set for dry runs.
    pub keep_workspace: bool,
}

/// Settings of one snapshot job.
#[derive(Debug, Clone)]
pub struct SnapshotJob {
    pub vagrant_box: String,
    pub studio_path: Utf8PathBuf,
    pub studio_license_path: Option<Utf8PathBuf>,
    pub turbo_path: String,
    pub overwrite: bool,
    pub install_script: InstallScriptSettings,
    pub startup_file: StartupFileSettings,
    /// Directory the VM working directory is created in. Defaults to the
    /// system temp directory.
    pub work_root: Option<Utf8PathBuf>,
}

/// External collaborators of a run.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub tasks: &'a dyn TaskRunner,
    pub executor: &'a dyn CommandExecutor,
    pub registry: &'a dyn ImageRegistry,
}

/// Terminal state of one run.
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    /// The target image is already published and overwriting is disallowed.
    Aborted,
    Failed(SnapshotError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the error of a failed run.
    pub fn error(&self) -> Option<&SnapshotError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of `vagrant destroy`.
#[derive(Debug)]
enum Teardown {
    Completed,
    Failed(SnapshotError),
}

/// Runs the snapshot workflow once.
///
/// The VM working directory and every child of the build workspace are
/// removed before this returns, whatever the outcome, unless the context
/// asks to keep the workspace.
pub fn perform(context: &BuildContext, job: &SnapshotJob, services: &Services<'_>) -> RunOutcome {
    info!("starting snapshot for project '{}'", context.project_name);
    let outcome = match run(context, job, services) {
        Ok(outcome) => outcome,
        Err(e) => RunOutcome::Failed(e),
    };

    if context.keep_workspace {
        debug!("keeping workspace {}", context.workspace);
    } else {
        quiet_delete_children(&context.workspace);
    }

    match &outcome {
        RunOutcome::Success => info!("snapshot completed successfully"),
        RunOutcome::Aborted => info!("snapshot aborted: image already published"),
        RunOutcome::Failed(e) => error!("snapshot failed: {}", error_chain(e)),
    }
    outcome
}

fn run(
    context: &BuildContext,
    job: &SnapshotJob,
    services: &Services<'_>,
) -> Result<RunOutcome, SnapshotError> {
    let target = load_import_target(&context.workspace)?;

    if should_abort(context, job, target.as_ref(), services.registry) {
        return Ok(RunOutcome::Aborted);
    }

    job.install_script.validate()?;
    job.startup_file.validate()?;

    let working_dir = create_working_dir(&context.project_name, job.work_root.as_deref())?;
    let result = take_snapshot(context, job, services, target.as_ref(), &working_dir);

    let path = working_dir.path().display().to_string();
    if let Err(e) = working_dir.close() {
        warn!("failed to remove working directory {}: {}", path, e);
    }

    result.map(|()| RunOutcome::Success)
}

fn should_abort(
    context: &BuildContext,
    job: &SnapshotJob,
    target: Option<&ImageId>,
    registry: &dyn ImageRegistry,
) -> bool {
    if job.overwrite {
        return false;
    }
    // Aborted ranks worst, so no prior result can take this branch.
    if context
        .current_result
        .is_some_and(|result| result.is_worse_than(BuildResult::Aborted))
    {
        return false;
    }
    let Some(image) = target else {
        return false;
    };

    match registry.is_available_remotely(image) {
        Ok(available) => {
            debug!("image {} available remotely: {}", image, available);
            available
        }
        Err(e) => {
            warn!("could not check whether {} is published: {:#}", image, e);
            false
        }
    }
}

fn create_working_dir(
    project_name: &str,
    work_root: Option<&Utf8Path>,
) -> Result<TempDir, SnapshotError> {
    let prefix = format!(
        "jenkins-{}-build-",
        NON_WORD_CHARS.replace_all(project_name, "")
    );
    let root = match work_root {
        Some(root) => root.as_std_path().to_path_buf(),
        None => std::env::temp_dir(),
    };
    let dir = tempfile::Builder::new()
        .prefix(&prefix)
        .tempdir_in(&root)
        .map_err(|e| {
            SnapshotError::io(
                format!("failed to create working directory in {}", root.display()),
                e,
            )
        })?;
    debug!("created working directory {}", dir.path().display());
    Ok(dir)
}

fn build_environment(
    context: &BuildContext,
    job: &SnapshotJob,
    working_dir: &TempDir,
) -> Result<VagrantEnvironment, SnapshotError> {
    let working_dir = Utf8PathBuf::from_path_buf(working_dir.path().to_path_buf()).map_err(|p| {
        SnapshotError::Config(format!(
            "working directory is not valid UTF-8: {}",
            p.display()
        ))
    })?;

    let mut builder = VagrantEnvironment::builder(working_dir)
        .box_name(job.vagrant_box.clone())
        .studio_path(job.studio_path.clone())
        .installer_path(
            context
                .workspace
                .join(INSTALL_DIRECTORY)
                .join(INSTALLER_EXE_FILE),
        );
    if let Some(license) = &job.studio_license_path {
        builder = builder.studio_license_path(license.clone());
    }
    builder = job.install_script.configure(builder);
    builder = job.startup_file.configure(builder);

    builder.build()
}

fn take_snapshot(
    context: &BuildContext,
    job: &SnapshotJob,
    services: &Services<'_>,
    target: Option<&ImageId>,
    working_dir: &TempDir,
) -> Result<(), SnapshotError> {
    let env = build_environment(context, job, working_dir)?;
    env.prepare()?;

    let provisioned = vagrant(services.tasks, context, VagrantCommand::Up, &env)
        .map_err(|e| SnapshotError::Provisioning(Box::new(e)));
    let primary = match provisioned {
        Ok(()) => import_image(job, services.executor, target, &env)
            .map_err(|e| SnapshotError::Import(Box::new(e))),
        Err(e) => Err(e),
    };

    let teardown = match vagrant(services.tasks, context, VagrantCommand::Destroy, &env) {
        Ok(()) => Teardown::Completed,
        Err(e) => Teardown::Failed(e),
    };

    settle(primary, teardown)
}

/// Combines the result of the VM work with the teardown outcome.
///
/// A failed provisioning is always reported as such, with any teardown
/// failure only logged. After a successful provisioning a teardown failure
/// is reported, keeping a failed import as its superseded cause.
fn settle(primary: Result<(), SnapshotError>, teardown: Teardown) -> Result<(), SnapshotError> {
    match (primary, teardown) {
        (Ok(()), Teardown::Completed) => Ok(()),
        (Err(e), Teardown::Completed) => Err(e),
        (Ok(()), Teardown::Failed(source)) => Err(SnapshotError::Teardown {
            source: Box::new(source),
            superseded: None,
        }),
        (Err(e @ SnapshotError::Provisioning(_)), Teardown::Failed(source)) => {
            error!(
                "`vagrant destroy` failed, the virtual machine may have to be removed from \
                 VirtualBox manually: {}",
                error_chain(&source)
            );
            Err(e)
        }
        (Err(e), Teardown::Failed(source)) => Err(SnapshotError::Teardown {
            source: Box::new(source),
            superseded: Some(Box::new(e)),
        }),
    }
}

fn vagrant(
    tasks: &dyn TaskRunner,
    context: &BuildContext,
    command: VagrantCommand,
    env: &VagrantEnvironment,
) -> Result<(), SnapshotError> {
    let task_name = format!("{} - {}", context.project_name, command.label());
    info!("{}", command.label());
    tasks.run(&task_name, &command.build().command_line(), env.working_dir())
}

fn import_image(
    job: &SnapshotJob,
    executor: &dyn CommandExecutor,
    target: Option<&ImageId>,
    env: &VagrantEnvironment,
) -> Result<(), SnapshotError> {
    let mut builder = ImportCommand::builder(&job.turbo_path)
        .image_type(IMAGE_TYPE)
        .path(env.image_path().as_str())
        .overwrite(job.overwrite);
    if let Some(image) = target {
        builder = builder.name(image.to_string());
    }

    info!("importing {}", env.image_path());
    builder.build()?.run(executor, Some(env.working_dir()))?;
    Ok(())
}

/// Removes every child of `dir`, logging failures instead of returning them.
pub fn quiet_delete_children(dir: &Utf8Path) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("failed to list {} for cleanup: {}", dir, e);
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("failed to read an entry of {} during cleanup: {}", dir, e);
                continue;
            }
        };
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
            _ => fs::remove_file(&path),
        };
        if let Err(e) = removed {
            warn!("failed to delete {}: {}", path.display(), e);
        }
    }
}
