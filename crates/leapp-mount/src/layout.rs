use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{IpuError, IpuResult};

pub const OVERLAY_NAME: &str = "system_overlay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    scratch: PathBuf,
}

impl ScratchLayout {
    pub fn new(scratch: impl Into<PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch
    }

    pub fn mounts_dir(&self) -> PathBuf {
        self.scratch.join("mounts")
    }

    pub fn disk_images_dir(&self) -> PathBuf {
        self.scratch.join("diskimages")
    }

    pub fn disk_image_path(&self) -> PathBuf {
        self.disk_images_dir().join("root.img")
    }

    pub fn overlay_workdir(&self) -> PathBuf {
        self.mounts_dir().join("root_")
    }

    pub fn overlay_target(&self) -> PathBuf {
        self.overlay_workdir().join(OVERLAY_NAME)
    }

    pub fn dnf_cache_target(&self) -> PathBuf {
        self.overlay_target().join("var").join("cache").join("dnf")
    }

    pub fn plugin_data_path(&self) -> PathBuf {
        self.scratch.join("dnf-plugin-data.txt")
    }

    pub fn ensure_base_dirs(&self) -> IpuResult<()> {
        for dir in [self.scratch.clone(), self.mounts_dir(), self.overlay_workdir()] {
            fs::create_dir_all(&dir).map_err(|err| {
                IpuError::stop_with_hint(
                    format!("Cannot create directory {}: {err}", dir.display()),
                    format!("Please ensure that {} is empty and modifiable.", dir.display()),
                )
            })?;
        }
        Ok(())
    }
}
