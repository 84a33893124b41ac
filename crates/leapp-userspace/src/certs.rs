use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{Architecture, Configuration, IpuError, IpuResult};
use leapp_mount::IsolatedActions;

const PRODUCT_CERT_DIRS: [&str; 2] = ["/etc/pki/product", "/etc/pki/product-default"];
const BACKUP_SUFFIX: &str = ".leapp-backup";

pub fn product_cert_id(arch: Architecture, variant: &str) -> Option<u32> {
    let variant = variant.trim();
    if !(variant.is_empty() || variant.eq_ignore_ascii_case("server")) {
        return None;
    }
    Some(match arch {
        Architecture::X86_64 => 479,
        Architecture::Aarch64 => 419,
        Architecture::Ppc64le => 279,
        Architecture::S390x => 72,
    })
}

pub fn product_cert_path(config: &Configuration) -> IpuResult<PathBuf> {
    let Some(id) = product_cert_id(config.architecture, &config.os_variant) else {
        return Err(IpuError::stop(format!(
            "Failed to determine what certificate to use for {} ({}).",
            config.architecture,
            if config.os_variant.is_empty() {
                "server"
            } else {
                config.os_variant.as_str()
            }
        )));
    };

    let path = config
        .paths
        .product_certs_dir
        .join(config.target_version.major.to_string())
        .join(format!("{id}.pem"));
    if !path.is_file() {
        return Err(IpuError::stop_with_hint(
            format!("Cannot find the product certificate {}", path.display()),
            "Please reinstall the leapp-repository package",
        ));
    }
    Ok(path)
}

pub struct SwitchedCertificate {
    moved: Vec<(PathBuf, PathBuf)>,
    installed: PathBuf,
}

impl SwitchedCertificate {
    pub fn install(context: &dyn IsolatedActions, cert: &Path) -> IpuResult<Self> {
        let mut switched = Self {
            moved: Vec::new(),
            installed: context.full_path(PRODUCT_CERT_DIRS[0]),
        };

        for dir in PRODUCT_CERT_DIRS {
            let original = context.full_path(dir);
            if !original.exists() {
                continue;
            }
            let backup = PathBuf::from(format!("{}{BACKUP_SUFFIX}", original.display()));
            fs::rename(&original, &backup).map_err(|err| {
                IpuError::io(format!("failed to move {} aside", original.display()), err)
            })?;
            switched.moved.push((backup, original));
        }

        let file_name = cert
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "target.pem".into());
        let destination = switched.installed.join(file_name);
        fs::create_dir_all(&switched.installed)
            .and_then(|_| fs::copy(cert, &destination))
            .map_err(|err| {
                IpuError::io(
                    format!("failed to install product certificate {}", destination.display()),
                    err,
                )
            })?;
        tracing::debug!(cert = %destination.display(), "target product certificate installed");
        Ok(switched)
    }
}

impl Drop for SwitchedCertificate {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.installed) {
            if self.installed.exists() {
                tracing::warn!(dir = %self.installed.display(), error = %err, "failed to remove target product certificate");
            }
        }
        for (backup, original) in self.moved.drain(..).rev() {
            if let Err(err) = fs::rename(&backup, &original) {
                tracing::warn!(
                    from = %backup.display(),
                    to = %original.display(),
                    error = %err,
                    "failed to restore product certificates"
                );
            }
        }
    }
}
