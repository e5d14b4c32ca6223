//! The Vagrant environment for one snapshot run.
//!
//! A [`VagrantEnvironment`] describes everything `vagrant up` needs: the base
//! box, the host files that are copied into the VM's shared folder and the
//! scripts the guest runs. [`VagrantEnvironment::prepare`] materialises that
//! description in the working directory:
//!
//! ```text
//! <working_dir>/
//!   Vagrantfile
//!   resources/   installer, studio tool, license, install.bat, snapshot.bat
//!   output/      image.svm, written by the guest
//! ```
//!
//! The working directory is shared with the guest as `C:\vagrant`.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use crate::command::{StudioBuildCommand, StudioSnapshotCommand, quote_windows_arg};
use crate::error::{SnapshotError, io_error_kind_message};

/// Directory of the build workspace that holds the installer.
pub const INSTALL_DIRECTORY: &str = "installer";
/// File name of the installer inside [`INSTALL_DIRECTORY`].
pub const INSTALLER_EXE_FILE: &str = "install.exe";

/// Guest mount point of the working directory.
pub const GUEST_SHARE_DIR: &str = r"C:\vagrant";
const GUEST_SNAPSHOT_DIR: &str = r"C:\snapshot";
const SNAPSHOT_XAPPL_FILE: &str = "Snapshot.xappl";

const RESOURCES_DIR: &str = "resources";
const OUTPUT_DIR: &str = "output";
const IMAGE_FILE: &str = "image.svm";
const INSTALL_SCRIPT_FILE: &str = "install.bat";
const PROVISION_SCRIPT_FILE: &str = "snapshot.bat";
const VAGRANTFILE: &str = "Vagrantfile";

/// Source of the install script run inside the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallScript {
    /// A script file on the host, copied into the shared folder.
    Fixed(Utf8PathBuf),
    /// A script generated from the installer's silent arguments.
    Generated {
        silent_install_args: String,
        ignore_exit_code: bool,
    },
}

/// Immutable description of one provisioning environment.
#[derive(Debug, Clone)]
pub struct VagrantEnvironment {
    working_dir: Utf8PathBuf,
    box_name: String,
    installer_path: Utf8PathBuf,
    studio_path: Utf8PathBuf,
    studio_license_path: Option<Utf8PathBuf>,
    install_script: InstallScript,
    startup_file_path: Option<Utf8PathBuf>,
    image_path: Utf8PathBuf,
}

/// Accumulates the fields of a [`VagrantEnvironment`].
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder {
    working_dir: Utf8PathBuf,
    box_name: Option<String>,
    installer_path: Option<Utf8PathBuf>,
    studio_path: Option<Utf8PathBuf>,
    studio_license_path: Option<Utf8PathBuf>,
    install_script: Option<InstallScript>,
    startup_file_path: Option<Utf8PathBuf>,
}

fn require<T>(value: Option<T>, field: &str) -> Result<T, SnapshotError> {
    value.ok_or_else(|| SnapshotError::Config(format!("{} must be set", field)))
}

impl EnvironmentBuilder {
    pub fn box_name(mut self, box_name: impl Into<String>) -> Self {
        self.box_name = Some(box_name.into());
        self
    }

    pub fn installer_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.installer_path = Some(path.into());
        self
    }

    pub fn studio_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.studio_path = Some(path.into());
        self
    }

    pub fn studio_license_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.studio_license_path = Some(path.into());
        self
    }

    /// Uses an existing install script. Replaces any generated script request.
    pub fn install_script_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.install_script = Some(InstallScript::Fixed(path.into()));
        self
    }

    /// Generates the install script. Replaces any fixed script path.
    pub fn generate_install_script(
        mut self,
        silent_install_args: impl Into<String>,
        ignore_exit_code: bool,
    ) -> Self {
        self.install_script = Some(InstallScript::Generated {
            silent_install_args: silent_install_args.into(),
            ignore_exit_code,
        });
        self
    }

    /// Path of the startup executable inside the captured image.
    pub fn startup_file_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.startup_file_path = Some(path.into());
        self
    }

    /// Builds the environment.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::Config` when the box, the installer path or
    /// the studio path has not been set or is blank.
    pub fn build(self) -> Result<VagrantEnvironment, SnapshotError> {
        let box_name = require(self.box_name.filter(|b| !b.trim().is_empty()), "box")?;
        let installer_path = require(
            self.installer_path.filter(|p| !p.as_str().trim().is_empty()),
            "installerPath",
        )?;
        let studio_path = require(
            self.studio_path.filter(|p| !p.as_str().trim().is_empty()),
            "studioPath",
        )?;
        let install_script = self.install_script.unwrap_or(InstallScript::Generated {
            silent_install_args: crate::settings::DEFAULT_SILENT_INSTALL_ARGS.to_string(),
            ignore_exit_code: false,
        });
        let image_path = self.working_dir.join(OUTPUT_DIR).join(IMAGE_FILE);

        Ok(VagrantEnvironment {
            working_dir: self.working_dir,
            box_name,
            installer_path,
            studio_path,
            studio_license_path: self.studio_license_path,
            install_script,
            startup_file_path: self.startup_file_path,
            image_path,
        })
    }
}

/// Joins path segments under the guest share using Windows separators.
fn guest_path(segments: &[&str]) -> String {
    let mut path = GUEST_SHARE_DIR.to_string();
    for segment in segments {
        path.push('\\');
        path.push_str(segment);
    }
    path
}

fn file_name<'a>(path: &'a Utf8Path, field: &str) -> Result<&'a str, SnapshotError> {
    path.file_name()
        .ok_or_else(|| SnapshotError::Config(format!("{} has no file name: {}", field, path)))
}

/// Joins batch-file lines with CRLF line endings.
fn batch(lines: &[String]) -> String {
    let mut script = lines.join("\r\n");
    script.push_str("\r\n");
    script
}

fn render_install_script(silent_install_args: &str, ignore_exit_code: bool) -> String {
    let installer = quote_windows_arg(&guest_path(&[RESOURCES_DIR, INSTALLER_EXE_FILE]));
    let run = if silent_install_args.trim().is_empty() {
        installer
    } else {
        format!("{} {}", installer, silent_install_args.trim())
    };
    let exit = if ignore_exit_code {
        "exit /b 0"
    } else {
        "exit /b %ERRORLEVEL%"
    };

    batch(&["@echo off".to_string(), run, exit.to_string()])
}

fn ruby_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Copies a host input file into the shared folder.
///
/// An input that cannot be read is a configuration error: the run must not
/// reach provisioning with a missing installer, studio tool or script.
fn copy_input(field: &str, from: &Utf8Path, to: &Utf8Path) -> Result<(), SnapshotError> {
    debug!("copying {} to {}", from, to);
    if !from.is_file() {
        return Err(SnapshotError::Config(format!("{} {} is not a file", field, from)));
    }
    fs::copy(from, to).map(|_| ()).map_err(|e| {
        SnapshotError::Config(format!(
            "failed to copy {} {}: {}",
            field,
            from,
            io_error_kind_message(&e)
        ))
    })
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<(), SnapshotError> {
    debug!("writing {}", path);
    fs::write(path, contents).map_err(|e| SnapshotError::io(format!("failed to write {}", path), e))
}

impl VagrantEnvironment {
    pub fn builder(working_dir: impl Into<Utf8PathBuf>) -> EnvironmentBuilder {
        EnvironmentBuilder {
            working_dir: working_dir.into(),
            box_name: None,
            installer_path: None,
            studio_path: None,
            studio_license_path: None,
            install_script: None,
            startup_file_path: None,
        }
    }

    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }

    pub fn install_script(&self) -> &InstallScript {
        &self.install_script
    }

    /// Host path of the captured image, written by the guest during provisioning.
    pub fn image_path(&self) -> &Utf8Path {
        &self.image_path
    }

    pub fn vagrantfile(&self) -> String {
        format!(
            r#"# Generated by spoon-snapshot
Vagrant.configure("2") do |config|
  config.vm.box = {box_name}
  config.vm.guest = :windows
  config.vm.communicator = "winrm"
  config.vm.boot_timeout = 1200
  config.vm.synced_folder ".", "/vagrant"
  config.vm.provider "virtualbox" do |vb|
    vb.gui = false
  end
  config.vm.provision "shell", path: "{RESOURCES_DIR}/{PROVISION_SCRIPT_FILE}"
end
"#,
            box_name = ruby_string(&self.box_name),
        )
    }

    /// Contents of the generated install script, or `None` for a fixed script.
    pub fn generated_install_script(&self) -> Option<String> {
        match &self.install_script {
            InstallScript::Fixed(_) => None,
            InstallScript::Generated {
                silent_install_args,
                ignore_exit_code,
            } => Some(render_install_script(silent_install_args, *ignore_exit_code)),
        }
    }

    /// Contents of the provisioning script the guest runs during `vagrant up`.
    pub fn provision_script(&self) -> Result<String, SnapshotError> {
        let studio = guest_path(&[RESOURCES_DIR, file_name(&self.studio_path, "studioPath")?]);
        let license = match &self.studio_license_path {
            Some(path) => Some(guest_path(&[RESOURCES_DIR, file_name(path, "studioLicensePath")?])),
            None => None,
        };
        let before_dir = format!(r"{}\before", GUEST_SNAPSHOT_DIR);
        let after_dir = format!(r"{}\after", GUEST_SNAPSHOT_DIR);
        let output_dir = guest_path(&[OUTPUT_DIR]);

        let before = StudioSnapshotCommand::Before.build(&studio, &before_dir, None, license.as_deref())?;
        let after = StudioSnapshotCommand::After.build(
            &studio,
            &before_dir,
            Some(&after_dir),
            license.as_deref(),
        )?;

        let mut build = StudioBuildCommand::builder(studio.as_str())
            .xappl_path(format!(r"{}\{}", after_dir, SNAPSHOT_XAPPL_FILE))
            .image_path(guest_path(&[OUTPUT_DIR, IMAGE_FILE]));
        if let Some(startup_file) = &self.startup_file_path {
            build = build.startup_file_path(startup_file.as_str());
        }
        if let Some(license) = &license {
            build = build.license_path(license.as_str());
        }
        let build = build.build()?;

        let check = "if errorlevel 1 exit /b %ERRORLEVEL%".to_string();
        Ok(batch(&[
            "@echo off".to_string(),
            "setlocal".to_string(),
            format!("if exist {0} rmdir /s /q {0}", GUEST_SNAPSHOT_DIR),
            format!("mkdir {}", before_dir),
            format!("mkdir {}", after_dir),
            format!("if not exist {0} mkdir {0}", output_dir),
            before.command_line(),
            check.clone(),
            format!(
                "call {}",
                quote_windows_arg(&guest_path(&[RESOURCES_DIR, INSTALL_SCRIPT_FILE]))
            ),
            check.clone(),
            after.command_line(),
            check,
            build.command_line(),
            "exit /b %ERRORLEVEL%".to_string(),
        ]))
    }

    /// Writes the Vagrantfile, the guest scripts and copies of the host
    /// resources into the working directory.
    pub fn prepare(&self) -> Result<(), SnapshotError> {
        let resources = self.working_dir.join(RESOURCES_DIR);
        for dir in [&resources, &self.working_dir.join(OUTPUT_DIR)] {
            fs::create_dir_all(dir)
                .map_err(|e| SnapshotError::io(format!("failed to create directory {}", dir), e))?;
        }

        copy_input("installerPath", &self.installer_path, &resources.join(INSTALLER_EXE_FILE))?;
        copy_input(
            "studioPath",
            &self.studio_path,
            &resources.join(file_name(&self.studio_path, "studioPath")?),
        )?;
        if let Some(license) = &self.studio_license_path {
            let target = resources.join(file_name(license, "studioLicensePath")?);
            copy_input("studioLicensePath", license, &target)?;
        }

        let install_script = resources.join(INSTALL_SCRIPT_FILE);
        match &self.install_script {
            InstallScript::Fixed(path) => copy_input("installScriptPath", path, &install_script)?,
            InstallScript::Generated {
                silent_install_args,
                ignore_exit_code,
            } => write_file(
                &install_script,
                &render_install_script(silent_install_args, *ignore_exit_code),
            )?,
        }

        write_file(&resources.join(PROVISION_SCRIPT_FILE), &self.provision_script()?)?;
        write_file(&self.working_dir.join(VAGRANTFILE), &self.vagrantfile())?;

        info!("prepared vagrant environment in {}", self.working_dir);
        Ok(())
    }
}
