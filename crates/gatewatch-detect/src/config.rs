//! Run configuration: optional YAML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use gatewatch_core::KeyScheme;
use gatewatch_storage::{BaselineSource, DateFileLayout, DirectoryBaselineSource, GitBaselineSource};
use serde::Deserialize;
use tracing::warn;

use crate::diff::DEFAULT_SAMPLE_LIMIT;
use crate::policy::{ChangePolicy, Decision};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineKind {
    #[default]
    Git,
    Directory,
}

impl FromStr for BaselineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(BaselineKind::Git),
            "directory" | "dir" => Ok(BaselineKind::Directory),
            other => Err(format!("unknown baseline kind `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub kind: BaselineKind,
    pub git_revision: String,
    pub repo_root: PathBuf,
    /// Path of the data directory relative to `repo_root`, as stored in git.
    pub repo_subdir: String,
    pub directory: PathBuf,
    pub timeout_secs: u64,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            kind: BaselineKind::Git,
            git_revision: "HEAD".to_string(),
            repo_root: PathBuf::from("."),
            repo_subdir: "data".to_string(),
            directory: PathBuf::from("./published"),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub data_dir: PathBuf,
    pub file_prefix: String,
    pub file_suffix: String,
    pub baseline: BaselineConfig,
    pub key_scheme: KeyScheme,
    pub unreachable_baseline: Decision,
    pub sample_limit: usize,
    /// Key=value signal file (GitHub Actions `GITHUB_OUTPUT`); stdout when unset.
    pub output_path: Option<PathBuf>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        let layout = DateFileLayout::default();
        Self {
            data_dir: PathBuf::from("./data"),
            file_prefix: layout.prefix,
            file_suffix: layout.suffix,
            baseline: BaselineConfig::default(),
            key_scheme: KeyScheme::TimeGate,
            unreachable_baseline: Decision::Unchanged,
            sample_limit: DEFAULT_SAMPLE_LIMIT,
            output_path: None,
        }
    }
}

impl DetectConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing detect config")
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_yaml_str(&text).with_context(|| format!("loading {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("GATEWATCH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATEWATCH_BASELINE_DIR") {
            self.baseline.directory = PathBuf::from(v);
        }
        if let Some(v) = lookup("GATEWATCH_GIT_REVISION") {
            self.baseline.git_revision = v;
        }
        if let Some(v) = lookup("GITHUB_OUTPUT").filter(|v| !v.trim().is_empty()) {
            self.output_path = Some(PathBuf::from(v));
        }
        override_parsed(&lookup, "GATEWATCH_BASELINE_KIND", &mut self.baseline.kind);
        override_parsed(&lookup, "GATEWATCH_BASELINE_TIMEOUT_SECS", &mut self.baseline.timeout_secs);
        override_parsed(&lookup, "GATEWATCH_KEY_SCHEME", &mut self.key_scheme);
        override_parsed(&lookup, "GATEWATCH_UNREACHABLE_BASELINE", &mut self.unreachable_baseline);
        self
    }

    pub fn layout(&self) -> DateFileLayout {
        DateFileLayout {
            prefix: self.file_prefix.clone(),
            suffix: self.file_suffix.clone(),
        }
    }

    pub fn policy(&self) -> ChangePolicy {
        ChangePolicy {
            key_scheme: self.key_scheme,
            sample_limit: self.sample_limit,
            unreachable_baseline: self.unreachable_baseline,
        }
    }

    pub fn baseline_timeout(&self) -> Duration {
        Duration::from_secs(self.baseline.timeout_secs)
    }

    pub fn baseline_source(&self) -> Box<dyn BaselineSource> {
        match self.baseline.kind {
            BaselineKind::Git => Box::new(GitBaselineSource::new(
                self.baseline.repo_root.clone(),
                self.baseline.git_revision.clone(),
                self.baseline.repo_subdir.clone(),
            )),
            BaselineKind::Directory => {
                Box::new(DirectoryBaselineSource::new(self.baseline.directory.clone()))
            }
        }
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(err) => warn!(key, value = %raw, %err, "ignoring invalid config override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_published_layout() {
        let config = DetectConfig::default();
        assert_eq!(config.layout().file_name_for("2026-02-01"), "flight-data-2026-02-01.json");
        assert_eq!(config.baseline_timeout(), Duration::from_secs(10));
        assert_eq!(config.policy(), ChangePolicy::default());
        assert_eq!(config.baseline.kind, BaselineKind::Git);
    }

    #[test]
    fn yaml_fills_in_defaults() {
        let config = DetectConfig::from_yaml_str(
            "data_dir: ./out\nkey_scheme: time_gate_flight\nbaseline:\n  kind: directory\n  directory: ./prev\n",
        )
        .expect("yaml");
        assert_eq!(config.data_dir, PathBuf::from("./out"));
        assert_eq!(config.key_scheme, KeyScheme::TimeGateFlight);
        assert_eq!(config.baseline.kind, BaselineKind::Directory);
        assert_eq!(config.baseline.directory, PathBuf::from("./prev"));
        assert_eq!(config.baseline.git_revision, "HEAD");
        assert_eq!(config.sample_limit, 5);
    }

    #[test]
    fn env_overrides_win_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("GATEWATCH_DATA_DIR", "/tmp/data"),
            ("GATEWATCH_BASELINE_TIMEOUT_SECS", "3"),
            ("GATEWATCH_KEY_SCHEME", "bogus"),
            ("GATEWATCH_UNREACHABLE_BASELINE", "changed"),
            ("GITHUB_OUTPUT", "/tmp/gh_output"),
        ]
        .into_iter()
        .collect();

        let config =
            DetectConfig::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.baseline.timeout_secs, 3);
        assert_eq!(config.key_scheme, KeyScheme::TimeGate);
        assert_eq!(config.unreachable_baseline, Decision::Changed);
        assert_eq!(config.output_path, Some(PathBuf::from("/tmp/gh_output")));
    }
}
