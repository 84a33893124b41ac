use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{argv, CommandError, CommandOutput, CommandRunner, MountError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopConfig {
    MountOnly,
    FormatAndMount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mount {
    Bind {
        source: PathBuf,
        target: PathBuf,
    },
    Loop {
        source: PathBuf,
        target: PathBuf,
        config: LoopConfig,
    },
    Overlay {
        name: String,
        source: PathBuf,
        workdir: PathBuf,
    },
    Null {
        target: PathBuf,
    },
}

impl Mount {
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::Bind {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn looped(
        source: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
        config: LoopConfig,
    ) -> Self {
        Self::Loop {
            source: source.into(),
            target: target.into(),
            config,
        }
    }

    pub fn overlay(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self::Overlay {
            name: name.into(),
            source: source.into(),
            workdir: workdir.into(),
        }
    }

    pub fn null(target: impl Into<PathBuf>) -> Self {
        Self::Null {
            target: target.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::Loop { .. } => "loop",
            Self::Overlay { .. } => "overlay",
            Self::Null { .. } => "null",
        }
    }

    pub fn target(&self) -> PathBuf {
        match self {
            Self::Bind { target, .. } | Self::Loop { target, .. } | Self::Null { target } => {
                target.clone()
            }
            Self::Overlay { name, workdir, .. } => workdir.join(name),
        }
    }

    pub fn acquire(self, runner: &dyn CommandRunner) -> Result<MountGuard<'_>, MountError> {
        let target = self.target();
        let loop_device = match &self {
            Self::Bind { source, target } => {
                ensure_exists(source)?;
                ensure_exists(target)?;
                mount_command(
                    runner,
                    &argv([
                        "mount".to_string(),
                        "--bind".to_string(),
                        source.display().to_string(),
                        target.display().to_string(),
                    ]),
                    target,
                )?;
                None
            }
            Self::Loop {
                source,
                target,
                config,
            } => Some(attach_and_mount(runner, source, target, *config)?),
            Self::Overlay {
                name,
                source,
                workdir,
            } => {
                ensure_exists(source)?;
                let upper = workdir.join("upper");
                let work = workdir.join("work");
                for dir in [&upper, &work, &target] {
                    fs::create_dir_all(dir).map_err(|source| MountError::Prepare {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                }
                let options = format!(
                    "lowerdir={},upperdir={},workdir={}",
                    source.display(),
                    upper.display(),
                    work.display()
                );
                mount_command(
                    runner,
                    &argv([
                        "mount".to_string(),
                        "-t".to_string(),
                        "overlay".to_string(),
                        name.clone(),
                        "-o".to_string(),
                        options,
                        target.display().to_string(),
                    ]),
                    &target,
                )?;
                None
            }
            Self::Null { .. } => None,
        };

        tracing::debug!(kind = self.kind(), target = %target.display(), "mount acquired");
        Ok(MountGuard {
            runner,
            mount: self,
            loop_device,
            released: false,
        })
    }
}

pub struct MountGuard<'r> {
    runner: &'r dyn CommandRunner,
    mount: Mount,
    loop_device: Option<String>,
    released: bool,
}

impl MountGuard<'_> {
    pub fn target(&self) -> PathBuf {
        self.mount.target()
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub fn loop_device(&self) -> Option<&str> {
        self.loop_device.as_deref()
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if matches!(self.mount, Mount::Null { .. }) {
            return;
        }

        let target = self.mount.target();
        unmount(self.runner, &target);
        if let Some(device) = self.loop_device.take() {
            if let Err(err) = mount_command(
                self.runner,
                &argv(["losetup".to_string(), "-d".to_string(), device.clone()]),
                &target,
            ) {
                tracing::warn!(device = %device, error = %err, "failed to detach loop device");
            }
        }
        tracing::debug!(kind = self.mount.kind(), target = %target.display(), "mount released");
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

pub struct MountStack<'r> {
    runner: &'r dyn CommandRunner,
    guards: Vec<MountGuard<'r>>,
}

impl<'r> MountStack<'r> {
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        Self {
            runner,
            guards: Vec::new(),
        }
    }

    pub fn push(&mut self, mount: Mount) -> Result<PathBuf, MountError> {
        let guard = mount.acquire(self.runner)?;
        let target = guard.target();
        self.guards.push(guard);
        Ok(target)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn targets(&self) -> Vec<PathBuf> {
        self.guards.iter().map(MountGuard::target).collect()
    }

    pub fn release(mut self) {
        self.unwind();
    }

    fn unwind(&mut self) {
        while let Some(guard) = self.guards.pop() {
            guard.release();
        }
    }
}

impl Drop for MountStack<'_> {
    fn drop(&mut self) {
        self.unwind();
    }
}

fn ensure_exists(path: &Path) -> Result<(), MountError> {
    if path.exists() {
        Ok(())
    } else {
        Err(MountError::MissingPath {
            path: path.to_path_buf(),
        })
    }
}

fn mount_command(
    runner: &dyn CommandRunner,
    argv: &[String],
    target: &Path,
) -> Result<CommandOutput, MountError> {
    tracing::debug!(command = %argv.join(" "), "running mount command");
    let output = runner
        .execute(argv, &BTreeMap::new())
        .map_err(|source| MountError::Spawn {
            target: target.to_path_buf(),
            source,
        })?;
    if output.success() {
        return Ok(output);
    }
    Err(MountError::Command {
        target: target.to_path_buf(),
        source: CommandError {
            command: argv.to_vec(),
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        },
    })
}

fn attach_and_mount(
    runner: &dyn CommandRunner,
    source: &Path,
    target: &Path,
    config: LoopConfig,
) -> Result<String, MountError> {
    ensure_exists(source)?;
    fs::create_dir_all(target).map_err(|err| MountError::Prepare {
        path: target.to_path_buf(),
        source: err,
    })?;

    let attached = mount_command(
        runner,
        &argv([
            "losetup".to_string(),
            "--find".to_string(),
            "--show".to_string(),
            source.display().to_string(),
        ]),
        target,
    )?;
    let device = attached.stdout.trim().to_string();

    let mounted = (|| {
        if config == LoopConfig::FormatAndMount {
            mount_command(
                runner,
                &argv(["mkfs.ext4".to_string(), "-F".to_string(), device.clone()]),
                target,
            )?;
        }
        mount_command(
            runner,
            &argv([
                "mount".to_string(),
                device.clone(),
                target.display().to_string(),
            ]),
            target,
        )
    })();

    if let Err(err) = mounted {
        if let Err(detach_err) = mount_command(
            runner,
            &argv(["losetup".to_string(), "-d".to_string(), device.clone()]),
            target,
        ) {
            tracing::warn!(device = %device, error = %detach_err, "failed to detach loop device");
        }
        return Err(err);
    }
    Ok(device)
}

pub(crate) fn unmount(runner: &dyn CommandRunner, target: &Path) {
    let target_str = target.display().to_string();
    let Err(err) = mount_command(
        runner,
        &argv(["umount".to_string(), target_str.clone()]),
        target,
    ) else {
        return;
    };
    tracing::debug!(target = %target_str, error = %err, "umount failed, retrying with -fl");

    if let Err(err) = mount_command(
        runner,
        &argv(["umount".to_string(), "-fl".to_string(), target_str.clone()]),
        target,
    ) {
        tracing::warn!(target = %target_str, error = %err, "failed to unmount");
    }
}
