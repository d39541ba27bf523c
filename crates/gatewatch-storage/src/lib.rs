//! Baseline retrieval, date-file discovery and atomic snapshot persistence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use gatewatch_core::Snapshot;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "gatewatch-storage";

#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("no baseline exists for {0}")]
    NotFound(String),
    #[error("baseline retrieval for {identifier} timed out after {timeout:?}")]
    Timeout {
        identifier: String,
        timeout: Duration,
    },
    #[error("baseline for {identifier} is not valid UTF-8: {message}")]
    Undecodable { identifier: String, message: String },
    #[error("baseline retrieval for {identifier} failed: {message}")]
    Other { identifier: String, message: String },
}

fn decode_baseline(identifier: &str, bytes: Vec<u8>) -> Result<String, BaselineError> {
    String::from_utf8(bytes).map_err(|err| BaselineError::Undecodable {
        identifier: identifier.to_string(),
        message: err.utf8_error().to_string(),
    })
}

#[async_trait]
pub trait BaselineSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch_baseline(&self, identifier: &str) -> Result<String, BaselineError>;
}

/// Runs `fetch_baseline` under `timeout`; an elapsed timer becomes [`BaselineError::Timeout`].
pub async fn fetch_baseline_with_timeout(
    source: &dyn BaselineSource,
    identifier: &str,
    timeout: Duration,
) -> Result<String, BaselineError> {
    match tokio::time::timeout(timeout, source.fetch_baseline(identifier)).await {
        Ok(result) => result,
        Err(_elapsed) => Err(BaselineError::Timeout {
            identifier: identifier.to_string(),
            timeout,
        }),
    }
}

/// Reads baselines out of a git revision with `git show <rev>:<subdir>/<file>`.
#[derive(Debug, Clone)]
pub struct GitBaselineSource {
    repo_root: PathBuf,
    revision: String,
    subdir: String,
}

impl GitBaselineSource {
    pub fn new(repo_root: impl Into<PathBuf>, revision: impl Into<String>, subdir: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            revision: revision.into(),
            subdir: subdir.into(),
        }
    }

    pub fn object_spec(&self, identifier: &str) -> String {
        let subdir = self.subdir.trim_matches('/');
        if subdir.is_empty() {
            format!("{}:{}", self.revision, identifier)
        } else {
            format!("{}:{}/{}", self.revision, subdir, identifier)
        }
    }
}

#[async_trait]
impl BaselineSource for GitBaselineSource {
    fn describe(&self) -> String {
        format!("git {} in {}", self.revision, self.repo_root.display())
    }

    async fn fetch_baseline(&self, identifier: &str) -> Result<String, BaselineError> {
        let spec = self.object_spec(identifier);
        let output = Command::new("git")
            .arg("show")
            .arg(&spec)
            .current_dir(&self.repo_root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| BaselineError::Other {
                identifier: identifier.to_string(),
                message: format!("spawning git: {err}"),
            })?;

        if output.status.success() {
            let stdout = decode_baseline(identifier, output.stdout)?;
            if stdout.trim().is_empty() {
                return Err(BaselineError::NotFound(identifier.to_string()));
            }
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(object = %spec, stderr = %stderr.trim(), "git show failed");
        Err(classify_git_failure(identifier, &stderr))
    }
}

/// A path missing from the revision, or a repository without that revision
/// yet, means the baseline never existed.
pub fn classify_git_failure(identifier: &str, stderr: &str) -> BaselineError {
    let lower = stderr.to_ascii_lowercase();
    let absent = [
        "does not exist in",
        "exists on disk, but not in",
        "invalid object name",
        "unknown revision",
    ];
    if absent.iter().any(|needle| lower.contains(needle)) {
        BaselineError::NotFound(identifier.to_string())
    } else {
        BaselineError::Other {
            identifier: identifier.to_string(),
            message: stderr.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryBaselineSource {
    root: PathBuf,
}

impl DirectoryBaselineSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BaselineSource for DirectoryBaselineSource {
    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }

    async fn fetch_baseline(&self, identifier: &str) -> Result<String, BaselineError> {
        let path = self.root.join(identifier);
        match fs::read(&path).await {
            Ok(bytes) => decode_baseline(identifier, bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BaselineError::NotFound(identifier.to_string()))
            }
            Err(err) => Err(BaselineError::Other {
                identifier: identifier.to_string(),
                message: format!("reading {}: {err}", path.display()),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("input directory {0} does not exist")]
    DirectoryMissing(PathBuf),
    #[error("listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFileLayout {
    pub prefix: String,
    pub suffix: String,
}

impl Default for DateFileLayout {
    fn default() -> Self {
        Self {
            prefix: "flight-data-".to_string(),
            suffix: ".json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFile {
    pub file_name: String,
    pub date: String,
    pub path: PathBuf,
}

impl DateFileLayout {
    pub fn file_name_for(&self, date: &str) -> String {
        format!("{}{}{}", self.prefix, date, self.suffix)
    }

    pub fn date_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(&self.prefix)?
            .strip_suffix(&self.suffix)
            .filter(|date| !date.is_empty())
    }

    pub async fn list(&self, dir: &Path) -> Result<Vec<DateFile>, DiscoveryError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DiscoveryError::DirectoryMissing(dir.to_path_buf()));
            }
            Err(source) => {
                return Err(DiscoveryError::Io {
                    path: dir.to_path_buf(),
                    source,
                })
            }
        };

        let mut files = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|source| DiscoveryError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let Some(entry) = entry else { break };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(date) = self.date_of(&file_name).map(str::to_string) else {
                continue;
            };
            files.push(DateFile {
                path: entry.path(),
                file_name,
                date,
            });
        }
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub path: PathBuf,
    pub byte_size: usize,
    pub replaced: bool,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    layout: DateFileLayout,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>, layout: DateFileLayout) -> Self {
        Self {
            root: root.into(),
            layout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, date: &str) -> PathBuf {
        self.root.join(self.layout.file_name_for(date))
    }

    pub async fn write_snapshot(&self, snapshot: &Snapshot) -> anyhow::Result<StoredSnapshot> {
        let bytes = snapshot
            .to_json_pretty()
            .with_context(|| format!("serializing snapshot for {}", snapshot.date))?;
        let path = self.path_for(&snapshot.date);

        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("creating data directory {}", self.root.display()))?;
        let replaced = fs::try_exists(&path)
            .await
            .with_context(|| format!("checking snapshot path {}", path.display()))?;

        let temp_path = self
            .root
            .join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| format!("opening temp snapshot file {}", temp_path.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("writing temp snapshot file {}", temp_path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing temp snapshot file {}", temp_path.display()))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err).with_context(|| {
                format!(
                    "atomically renaming temp snapshot {} -> {}",
                    temp_path.display(),
                    path.display()
                )
            });
        }

        Ok(StoredSnapshot {
            path,
            byte_size: bytes.len(),
            replaced,
        })
    }
}
