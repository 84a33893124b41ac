use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{argv, run_checked, CommandRunner, IpuError, IpuResult};

use crate::fs_utils::remove_dir_if_exists;
use crate::ScratchLayout;

pub const DEFAULT_OVERLAY_DISK_SIZE_MIB: u64 = 2048;

pub fn overlay_disk_size(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_OVERLAY_DISK_SIZE_MIB;
    };
    match raw.trim().parse::<u64>() {
        Ok(size) if size > 0 => size,
        _ => {
            tracing::warn!(
                value = raw,
                default = DEFAULT_OVERLAY_DISK_SIZE_MIB,
                "invalid overlay disk size, using the default"
            );
            DEFAULT_OVERLAY_DISK_SIZE_MIB
        }
    }
}

pub struct ScratchCleanup {
    dir: PathBuf,
    armed: bool,
}

impl ScratchCleanup {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScratchCleanup {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::info!(dir = %self.dir.display(), "cleaning up scratch directory after failure");
        if let Err(err) = remove_dir_if_exists(&self.dir) {
            tracing::warn!(dir = %self.dir.display(), error = %err, "failed to clean scratch directory");
        }
    }
}

pub fn create_disk_image(
    runner: &dyn CommandRunner,
    layout: &ScratchLayout,
    size_mib: u64,
) -> IpuResult<PathBuf> {
    let images_dir = layout.disk_images_dir();
    fs::create_dir_all(&images_dir).map_err(|err| {
        IpuError::stop_with_hint(
            format!("Cannot create directory {}: {err}", images_dir.display()),
            format!(
                "Please ensure that {} is empty and modifiable.",
                images_dir.display()
            ),
        )
    })?;
    let cleanup = ScratchCleanup::new(&images_dir);

    let image = layout.disk_image_path();
    allocate_image(runner, &image, layout.scratch_dir(), size_mib)?;
    format_image(runner, &image)?;

    cleanup.disarm();
    tracing::info!(image = %image.display(), size_mib, "created scratch disk image");
    Ok(image)
}

fn allocate_image(
    runner: &dyn CommandRunner,
    image: &Path,
    scratch_dir: &Path,
    size_mib: u64,
) -> IpuResult<()> {
    let command = argv([
        "dd".to_string(),
        "if=/dev/zero".to_string(),
        format!("of={}", image.display()),
        "bs=1M".to_string(),
        format!("count={size_mib}"),
    ]);
    run_checked(runner, &command).map_err(|err| {
        let details = err.details().unwrap_or_default().to_string();
        IpuError::stop_with_hint(
            format!("Cannot create the disk image {}", image.display()),
            format!(
                "Please ensure that there is enough free space at {}, need {size_mib} MiB.",
                scratch_dir.display()
            ),
        )
        .with_details(details)
    })?;
    Ok(())
}

fn format_image(runner: &dyn CommandRunner, image: &Path) -> IpuResult<()> {
    let command = argv([
        "mkfs.ext4".to_string(),
        "-F".to_string(),
        image.display().to_string(),
    ]);
    run_checked(runner, &command).map_err(|err| {
        let stderr = err.details().unwrap_or_default().trim().to_string();
        IpuError::stop(format!(
            "Cannot create the ext4 filesystem on {}: {stderr}",
            image.display()
        ))
        .with_details(stderr)
    })?;
    Ok(())
}
