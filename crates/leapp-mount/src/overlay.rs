use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use leapp_core::{CommandRunner, IpuError, IpuResult, MountError, XfsPresence};

use crate::disk_image::{create_disk_image, ScratchCleanup};
use crate::fs_utils::remove_dir_if_exists;
use crate::mounts::unmount;
use crate::{LoopConfig, Mount, MountStack, ScratchLayout, OVERLAY_NAME};

const MOUNT_TABLE: &str = "/proc/self/mounts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayStrategy {
    ScratchImage,
    InPlace,
}

impl OverlayStrategy {
    pub fn from_facts(facts: &[XfsPresence]) -> Self {
        if facts.len() > 1 {
            tracing::warn!(
                count = facts.len(),
                "multiple XFS presence facts found, using the first one"
            );
        }
        match facts.first() {
            Some(xfs) if xfs.present && xfs.without_ftype => Self::ScratchImage,
            _ => Self::InPlace,
        }
    }
}

pub struct SourceOverlay<'r> {
    stack: MountStack<'r>,
    target: PathBuf,
}

impl SourceOverlay<'_> {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn push(&mut self, mount: Mount) -> Result<PathBuf, MountError> {
        self.stack.push(mount)
    }

    pub fn release(self) {
        self.stack.release();
    }
}

pub fn create_source_overlay<'r>(
    runner: &'r dyn CommandRunner,
    layout: &ScratchLayout,
    source_root: &Path,
    strategy: OverlayStrategy,
    disk_size_mib: u64,
) -> IpuResult<SourceOverlay<'r>> {
    clear_mounts_dir(runner, layout, Path::new(MOUNT_TABLE))?;
    layout.ensure_base_dirs()?;
    let cleanup = ScratchCleanup::new(layout.disk_images_dir());
    let mut stack = MountStack::new(runner);

    let workdir = layout.overlay_workdir();
    match strategy {
        OverlayStrategy::ScratchImage => {
            let image = create_disk_image(runner, layout, disk_size_mib)?;
            stack.push(Mount::looped(image, &workdir, LoopConfig::MountOnly))?;
        }
        OverlayStrategy::InPlace => {
            stack.push(Mount::null(&workdir))?;
        }
    }
    let target = stack.push(Mount::overlay(OVERLAY_NAME, source_root, &workdir))?;

    cleanup.disarm();

    tracing::info!(
        target = %target.display(),
        strategy = ?strategy,
        "source overlay ready"
    );
    Ok(SourceOverlay { stack, target })
}

pub(crate) fn clear_mounts_dir(
    runner: &dyn CommandRunner,
    layout: &ScratchLayout,
    mount_table: &Path,
) -> IpuResult<()> {
    let mounts_dir = layout.mounts_dir();
    for target in mounted_under(&read_mount_table(mount_table)?, &mounts_dir) {
        tracing::warn!(target = %target.display(), "releasing stale mount");
        unmount(runner, &target);
    }
    // Never recurse into a tree that is still attached.
    let remaining = mounted_under(&read_mount_table(mount_table)?, &mounts_dir);
    if let Some(busy) = remaining.first() {
        return Err(MountError::Busy { target: busy.clone() }.into());
    }
    remove_dir_if_exists(&mounts_dir)
}

fn read_mount_table(path: &Path) -> IpuResult<String> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(IpuError::io(format!("failed to read {}", path.display()), err)),
    }
}

pub(crate) fn mounted_under(table: &str, dir: &Path) -> Vec<PathBuf> {
    let mut targets = table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(field.replace("\\040", " ")))
        .filter(|target| target.starts_with(dir))
        .collect::<Vec<_>>();
    targets.sort_by_key(|target| std::cmp::Reverse(target.components().count()));
    targets.dedup();
    targets
}
