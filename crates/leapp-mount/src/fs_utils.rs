use std::fs;
use std::io;
use std::path::Path;

use leapp_core::{IpuError, IpuResult};

pub fn remove_dir_if_exists(path: &Path) -> IpuResult<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path)
            .map_err(|err| IpuError::io(format!("failed to remove {}", path.display()), err)),
        Ok(_) => fs::remove_file(path)
            .map_err(|err| IpuError::io(format!("failed to remove {}", path.display()), err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(IpuError::io(
            format!("failed to stat {}", path.display()),
            err,
        )),
    }
}

pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> IpuResult<()> {
    fs::create_dir_all(dst)
        .map_err(|err| IpuError::io(format!("failed to create {}", dst.display()), err))?;
    let entries = fs::read_dir(src)
        .map_err(|err| IpuError::io(format!("failed to read {}", src.display()), err))?;
    for entry in entries {
        let entry =
            entry.map_err(|err| IpuError::io(format!("failed to read {}", src.display()), err))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .map_err(|err| IpuError::io(format!("failed to stat {}", src_path.display()), err))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }

        #[cfg(unix)]
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path).map_err(|err| {
                IpuError::io(format!("failed to read symlink {}", src_path.display()), err)
            })?;
            std::os::unix::fs::symlink(&target, &dst_path).map_err(|err| {
                IpuError::io(
                    format!(
                        "failed to create symlink {} -> {}",
                        dst_path.display(),
                        target.display()
                    ),
                    err,
                )
            })?;
            continue;
        }

        fs::copy(&src_path, &dst_path).map_err(|err| {
            IpuError::io(
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                ),
                err,
            )
        })?;
    }
    Ok(())
}

pub fn replace_tree(src: &Path, dst: &Path) -> IpuResult<()> {
    remove_dir_if_exists(dst)?;
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| IpuError::io(format!("failed to create {}", parent.display()), err))?;
    }
    let metadata = fs::metadata(src)
        .map_err(|err| IpuError::io(format!("failed to stat {}", src.display()), err))?;
    if metadata.is_file() {
        fs::copy(src, dst).map_err(|err| {
            IpuError::io(
                format!("failed to copy {} to {}", src.display(), dst.display()),
                err,
            )
        })?;
        return Ok(());
    }
    copy_dir_recursive(src, dst)
}
