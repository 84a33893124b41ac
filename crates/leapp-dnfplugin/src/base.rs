use std::fs;
use std::path::{Path, PathBuf};

use leapp_core::{read_repo_dir, run, CallOptions, CommandRunner, IpuError, IpuResult};

use crate::{DnfOptions, RepoState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTransaction {
    pub summary: Vec<String>,
}

pub trait DnfBase {
    fn configure(&mut self, options: &DnfOptions) -> IpuResult<()>;
    fn repos(&self) -> IpuResult<Vec<RepoState>>;
    fn set_repos(&mut self, repos: Vec<RepoState>);
    fn enable_module(&mut self, module_stream: &str) -> IpuResult<()>;
    fn add_local_rpm(&mut self, path: &str) -> IpuResult<()>;
    fn remove(&mut self, spec: &str) -> IpuResult<bool>;
    fn install(&mut self, spec: &str) -> IpuResult<bool>;
    fn upgrade(&mut self, spec: &str) -> IpuResult<bool>;
    fn resolve(&mut self) -> IpuResult<ResolvedTransaction>;
    fn download(&mut self, transaction: &ResolvedTransaction) -> IpuResult<()>;
    fn run_transaction(&mut self, transaction: &ResolvedTransaction) -> IpuResult<()>;
}

pub struct DnfCli<'r> {
    runner: &'r dyn CommandRunner,
    binary: String,
    options: DnfOptions,
    repos: Vec<RepoState>,
    script: Vec<String>,
    script_path: PathBuf,
}

impl<'r> DnfCli<'r> {
    pub fn new(runner: &'r dyn CommandRunner, script_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            binary: "dnf".to_string(),
            options: DnfOptions::default(),
            repos: Vec::new(),
            script: Vec::new(),
            script_path: script_path.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn script(&self) -> &[String] {
        &self.script
    }

    fn root(&self) -> &str {
        self.options.installroot.as_deref().unwrap_or("/")
    }

    pub fn global_args(&self) -> Vec<String> {
        let options = &self.options;
        let mut args = vec![
            self.binary.clone(),
            "--assumeyes".to_string(),
            format!("--releasever={}", options.releasever),
            format!("--setopt=module_platform_id={}", options.module_platform_id),
            format!("--setopt=gpgcheck={}", u8::from(options.gpgcheck)),
            format!("--setopt=best={}", if options.best { "True" } else { "False" }),
        ];
        if let Some(root) = &options.installroot {
            args.push(format!("--installroot={root}"));
        }
        if !options.gpgcheck {
            args.push("--nogpgcheck".to_string());
        }
        if options.debugsolver {
            args.push("--debugsolver".to_string());
        }
        if options.allow_erasing {
            args.push("--allowerasing".to_string());
        }
        if options.cacheonly {
            args.push("--cacheonly".to_string());
        }
        if options.tsflags_test {
            args.push("--setopt=tsflags=test".to_string());
        }
        if options.download_only {
            args.push("--downloadonly".to_string());
        }

        args.push("--disablerepo=*".to_string());
        for repo in self.repos.iter().filter(|repo| repo.enabled) {
            args.push(format!("--enablerepo={}", repo.id));
            if repo.mirrorlist_overridden {
                if let Some(mirrorlist) = &repo.mirrorlist {
                    args.push(format!("--setopt={}.mirrorlist={}", repo.id, mirrorlist));
                }
            }
        }
        args
    }

    fn query_available(&self, spec: &str) -> IpuResult<bool> {
        for flag in [None, Some("--whatprovides")] {
            let mut command = self.global_args();
            command.push("repoquery".to_string());
            command.push("--quiet".to_string());
            command.extend(flag.map(str::to_string));
            command.push(spec.to_string());
            let output = run(self.runner, &command, &CallOptions::unchecked())?;
            if output.success() && !output.stdout.trim().is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn run_script(&self, terminator: &[&str], checked: bool) -> IpuResult<leapp_core::CommandOutput> {
        let mut lines = self.script.clone();
        lines.extend(terminator.iter().map(|line| line.to_string()));
        lines.push("exit".to_string());

        if let Some(parent) = self.script_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                IpuError::io(format!("failed to create {}", parent.display()), err)
            })?;
        }
        fs::write(&self.script_path, format!("{}\n", lines.join("\n"))).map_err(|err| {
            IpuError::io(
                format!("failed to write dnf shell script: {}", self.script_path.display()),
                err,
            )
        })?;

        let mut command = self.global_args();
        command.push("shell".to_string());
        command.push(self.script_path.display().to_string());
        let options = if checked {
            CallOptions::checked()
        } else {
            CallOptions::unchecked()
        };
        run(self.runner, &command, &options.with_env("LANG", "C"))
    }
}

impl DnfBase for DnfCli<'_> {
    fn configure(&mut self, options: &DnfOptions) -> IpuResult<()> {
        self.options = options.clone();
        Ok(())
    }

    fn repos(&self) -> IpuResult<Vec<RepoState>> {
        let dir = Path::new(self.root()).join("etc").join("yum.repos.d");
        Ok(read_repo_dir(&dir)?
            .into_iter()
            .map(RepoState::from)
            .collect())
    }

    fn set_repos(&mut self, repos: Vec<RepoState>) {
        self.repos = repos;
    }

    fn enable_module(&mut self, module_stream: &str) -> IpuResult<()> {
        self.script.push(format!("module enable {module_stream}"));
        Ok(())
    }

    fn add_local_rpm(&mut self, path: &str) -> IpuResult<()> {
        if !Path::new(path).is_file() {
            return Err(IpuError::stop(format!(
                "Local RPM package {path} does not exist"
            )));
        }
        self.script.push(format!("install {path}"));
        Ok(())
    }

    fn remove(&mut self, spec: &str) -> IpuResult<bool> {
        let command = vec![
            "rpm".to_string(),
            "--root".to_string(),
            self.root().to_string(),
            "-q".to_string(),
            "--whatprovides".to_string(),
            spec.to_string(),
        ];
        let installed = run(self.runner, &command, &CallOptions::unchecked())?.success();
        if installed {
            self.script.push(format!("remove {spec}"));
        }
        Ok(installed)
    }

    fn install(&mut self, spec: &str) -> IpuResult<bool> {
        let available = self.query_available(spec)?;
        if available {
            self.script.push(format!("install {spec}"));
        }
        Ok(available)
    }

    fn upgrade(&mut self, spec: &str) -> IpuResult<bool> {
        let available = self.query_available(spec)?;
        if available {
            self.script.push(format!("upgrade {spec}"));
        }
        Ok(available)
    }

    fn resolve(&mut self) -> IpuResult<ResolvedTransaction> {
        let output = self.run_script(&["ts solve", "ts list"], false)?;
        if !output.success() {
            let diagnostic = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(IpuError::Resolution { diagnostic });
        }
        Ok(ResolvedTransaction {
            summary: output
                .stdout
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        })
    }

    fn download(&mut self, _transaction: &ResolvedTransaction) -> IpuResult<()> {
        self.run_script(&["ts run"], true)?;
        Ok(())
    }

    fn run_transaction(&mut self, _transaction: &ResolvedTransaction) -> IpuResult<()> {
        self.run_script(&["ts run"], true)?;
        Ok(())
    }
}
