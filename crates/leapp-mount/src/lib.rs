mod disk_image;
mod fs_utils;
mod isolation;
mod layout;
mod mounts;
mod overlay;

pub use disk_image::{
    create_disk_image, overlay_disk_size, ScratchCleanup, DEFAULT_OVERLAY_DISK_SIZE_MIB,
};
pub use fs_utils::{remove_dir_if_exists, replace_tree};
pub use isolation::{IsolatedActions, NotIsolatedActions, NspawnActions};
pub use layout::{ScratchLayout, OVERLAY_NAME};
pub use mounts::{LoopConfig, Mount, MountGuard, MountStack};
pub use overlay::{create_source_overlay, OverlayStrategy, SourceOverlay};
