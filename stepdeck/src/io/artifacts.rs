//! Artifact store rooted at `<project>/<artifact_subpath>/<task>/<step>/`.
//!
//! Every path segment below the root passes through [`sanitize`], so task
//! names, step titles and action keys can never escape the store.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::key::{ActionKey, sanitize};
use crate::core::path::to_slash;

/// Relative artifact locations for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionArtifactPaths {
    pub command_log: String,
    pub display: String,
    pub files_dir: String,
    pub git_diff: String,
    pub git_changed_dir: String,
}

impl ActionArtifactPaths {
    pub fn new(key: &ActionKey) -> Self {
        let key = key.as_str();
        Self {
            command_log: format!("logs/{key}/command.log"),
            display: format!("logs/{key}/display.txt"),
            files_dir: format!("files/{key}"),
            git_diff: format!("git/{key}/changes.diff"),
            git_changed_dir: format!("git/{key}/changed"),
        }
    }

    pub fn file_snapshot(&self, basename: &str) -> String {
        format!("{}/{basename}", self.files_dir)
    }

    pub fn changed_snapshot(&self, basename: &str) -> String {
        format!("{}/{basename}", self.git_changed_dir)
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    project_dir: PathBuf,
    root: PathBuf,
    task: String,
    step: String,
}

impl ArtifactStore {
    pub fn new(project_dir: &Path, artifact_root: &Path, task: &str, step: &str) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            root: artifact_root.to_path_buf(),
            task: sanitize(task),
            step: sanitize(step),
        }
    }

    /// Store for another step of the same task.
    pub fn for_step(&self, step: &str) -> Self {
        Self {
            step: sanitize(step),
            ..self.clone()
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<task>/<step>`.
    pub fn base_dir(&self) -> PathBuf {
        self.root.join(&self.task).join(&self.step)
    }

    /// Absolute location for `rel` inside this step's directory.
    pub fn path_for(&self, rel: &str) -> Result<PathBuf> {
        let mut path = self.base_dir();
        let mut pushed = false;
        for segment in rel.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => bail!("artifact path may not contain '..': {rel}"),
                other => {
                    path.push(sanitize(other));
                    pushed = true;
                }
            }
        }
        if !pushed {
            bail!("empty artifact path");
        }
        Ok(path)
    }

    /// Create the parent directory of `rel` and return its absolute path.
    pub fn prepare(&self, rel: &str) -> Result<PathBuf> {
        let path = self.path_for(rel)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create artifact dir {}", parent.display()))?;
        }
        Ok(path)
    }

    /// Write `contents` to `rel`, overwriting any previous artifact.
    pub fn save(&self, rel: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.prepare(rel)?;
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %path.display(), "artifact saved");
        Ok(path)
    }

    /// Copy the file at `src` into the store at `rel`.
    pub fn save_file(&self, rel: &str, src: &Path) -> Result<PathBuf> {
        let path = self.prepare(rel)?;
        fs::copy(src, &path)
            .with_context(|| format!("copy {} to {}", src.display(), path.display()))?;
        debug!(path = %path.display(), "artifact copied");
        Ok(path)
    }

    /// Web path for an artifact when it lives under `<project>/public`.
    pub fn publish_path(&self, abs: &Path) -> Option<String> {
        let rel = abs.strip_prefix(self.project_dir.join("public")).ok()?;
        Some(format!("/{}", to_slash(rel)))
    }
}

/// File name of `path` as a string, or `file` when it has none.
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> ArtifactStore {
        ArtifactStore::new(root, &root.join("public/artifacts"), "demo task", "Install deps")
    }

    #[test]
    fn base_dir_sanitizes_task_and_step() {
        let store = store(Path::new("/srv/app"));
        assert_eq!(
            store.base_dir(),
            PathBuf::from("/srv/app/public/artifacts/demo-task/Install-deps")
        );
    }

    #[test]
    fn save_creates_directories_and_overwrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store(temp.path());
        let first = store.save("logs/runshell-00/command.log", "one").expect("save");
        let second = store.save("logs/runshell-00/command.log", "two").expect("save");
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(second).expect("read"), "two");
    }

    #[test]
    fn parent_segments_are_rejected() {
        let store = store(Path::new("/srv/app"));
        assert!(store.path_for("../escape.txt").is_err());
        assert!(store.path_for("/").is_err());
    }

    #[test]
    fn unsafe_segments_are_sanitized() {
        let store = store(Path::new("/srv/app"));
        let path = store.path_for("files/key/my file.txt").expect("path");
        assert!(path.ends_with("files/key/my-file.txt"));
    }

    #[test]
    fn publish_path_is_relative_to_public() {
        let store = store(Path::new("/srv/app"));
        let abs = store.path_for("logs/k/command.log").expect("path");
        assert_eq!(
            store.publish_path(&abs).as_deref(),
            Some("/artifacts/demo-task/Install-deps/logs/k/command.log")
        );
        assert_eq!(store.publish_path(Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn action_paths_follow_layout() {
        let key = crate::core::key::derive_key(&crate::model::action::Action::shell("ls"), 0);
        let paths = ActionArtifactPaths::new(&key);
        assert_eq!(paths.command_log, "logs/runshell-00/command.log");
        assert_eq!(paths.changed_snapshot("a.txt"), "git/runshell-00/changed/a.txt");
    }
}
