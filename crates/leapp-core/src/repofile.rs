use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::{IpuError, IpuResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDefinition {
    pub id: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub baseurl: Option<String>,
    pub mirrorlist: Option<String>,
    pub file: PathBuf,
}

pub fn parse_repo_file(raw: &str, file: &Path) -> Vec<RepoDefinition> {
    let mut repos: Vec<RepoDefinition> = Vec::new();

    for line in raw.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            repos.push(RepoDefinition {
                id: section.trim().to_string(),
                name: None,
                enabled: true,
                baseurl: None,
                mirrorlist: None,
                file: file.to_path_buf(),
            });
            continue;
        }

        let Some(current) = repos.last_mut() else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "name" => current.name = Some(value),
            "enabled" => current.enabled = matches!(value.as_str(), "1" | "true" | "yes"),
            "baseurl" => current.baseurl = Some(value),
            "mirrorlist" => current.mirrorlist = Some(value),
            _ => {}
        }
    }

    repos
}

pub fn read_repo_dir(dir: &Path) -> IpuResult<Vec<RepoDefinition>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(IpuError::io(
                format!("failed to read repository directory: {}", dir.display()),
                err,
            ));
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            IpuError::io(format!("failed to read {}", dir.display()), err)
        })?;
        let path = entry.path();
        if path.extension().and_then(|v| v.to_str()) == Some("repo") {
            files.push(path);
        }
    }
    files.sort();

    let mut repos = Vec::new();
    for path in files {
        let raw = fs::read_to_string(&path).map_err(|err| {
            IpuError::io(format!("failed to read repo file: {}", path.display()), err)
        })?;
        repos.extend(parse_repo_file(&raw, &path));
    }
    Ok(repos)
}
