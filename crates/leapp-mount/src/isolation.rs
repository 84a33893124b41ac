use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{run, CallOptions, CommandOutput, CommandRunner, IpuError, IpuResult};

use crate::fs_utils::{remove_dir_if_exists, replace_tree};

pub trait IsolatedActions {
    fn base_dir(&self) -> &Path;

    fn call(&self, argv: &[String], options: &CallOptions) -> IpuResult<CommandOutput>;

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_dir().join(path.trim_start_matches('/'))
    }

    fn makedirs(&self, path: &str) -> IpuResult<PathBuf> {
        let full = self.full_path(path);
        fs::create_dir_all(&full)
            .map_err(|err| IpuError::io(format!("failed to create {}", full.display()), err))?;
        Ok(full)
    }

    fn remove_tree(&self, path: &str) -> IpuResult<()> {
        remove_dir_if_exists(&self.full_path(path))
    }

    fn copytree_from(&self, host_path: &Path, path: &str) -> IpuResult<()> {
        let destination = self.full_path(path);
        tracing::debug!(
            from = %host_path.display(),
            to = %destination.display(),
            "copying host tree into context"
        );
        replace_tree(host_path, &destination)
    }

    fn copytree_to(&self, path: &str, host_path: &Path) -> IpuResult<()> {
        let source = self.full_path(path);
        tracing::debug!(
            from = %source.display(),
            to = %host_path.display(),
            "copying context tree to host"
        );
        replace_tree(&source, host_path)
    }
}

pub struct NotIsolatedActions<'r> {
    runner: &'r dyn CommandRunner,
    base_dir: PathBuf,
}

impl<'r> NotIsolatedActions<'r> {
    pub fn new(runner: &'r dyn CommandRunner, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            base_dir: base_dir.into(),
        }
    }
}

impl IsolatedActions for NotIsolatedActions<'_> {
    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn call(&self, argv: &[String], options: &CallOptions) -> IpuResult<CommandOutput> {
        run(self.runner, argv, options)
    }
}

pub struct NspawnActions<'r> {
    runner: &'r dyn CommandRunner,
    base_dir: PathBuf,
    binds: Vec<(PathBuf, String)>,
    env: BTreeMap<String, String>,
}

impl<'r> NspawnActions<'r> {
    pub fn new(runner: &'r dyn CommandRunner, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            base_dir: base_dir.into(),
            binds: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_bind(mut self, host: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        self.binds.push((host.into(), path.into()));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn nspawn_argv(&self, argv: &[String], env: &BTreeMap<String, String>) -> Vec<String> {
        let mut command = vec![
            "systemd-nspawn".to_string(),
            "--register=no".to_string(),
            "--quiet".to_string(),
            "--keep-unit".to_string(),
            "-D".to_string(),
            self.base_dir.display().to_string(),
        ];
        for (host, path) in &self.binds {
            command.push(format!("--bind={}:{}", host.display(), path));
        }
        for (key, value) in self.env.iter().chain(env.iter()) {
            command.push(format!("--setenv={key}={value}"));
        }
        command.extend(argv.iter().cloned());
        command
    }
}

impl IsolatedActions for NspawnActions<'_> {
    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn call(&self, argv: &[String], options: &CallOptions) -> IpuResult<CommandOutput> {
        let command = self.nspawn_argv(argv, &options.env);
        let outer = CallOptions {
            checked: options.checked,
            env: BTreeMap::new(),
        };
        run(self.runner, &command, &outer)
    }
}
