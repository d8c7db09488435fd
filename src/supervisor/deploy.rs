// src/supervisor/deploy.rs

//! New deployments: single sources, local directories and git repositories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, info, warn};

use crate::errors::{BotkeeperError, Result};
use crate::fs::{remove_file_if_exists, walk_files};
use crate::launcher::run_bounded;
use crate::types::{BotId, Deployed, OwnerId};

use super::Supervisor;

impl Supervisor {
    /// Write `content` to `bot_{id}_{owner}.<ext>`, launch it and register it.
    ///
    /// If the launch fails the file is removed again and no record is
    /// created.
    pub async fn deploy(&self, owner: OwnerId, content: &str) -> Result<Deployed> {
        if content.trim().is_empty() {
            return Err(BotkeeperError::Validation(
                "script content is empty".to_string(),
            ));
        }

        let mut state = self.lock_for_write().await?;

        let id = state.registry.allocatable_id()?;
        let file = self.single_file_path(id, owner);
        let name = script_name(id);

        if let Err(e) = self.fs.write(&file, self.render_source(content).as_bytes()) {
            self.discard_source(&file);
            return Err(e);
        }

        let process = match self.launcher.launch(&file, &name) {
            Ok(p) => p,
            Err(e) => {
                warn!(bot = id, owner, file = ?file, error = %e, "launch failed; discarding source");
                self.discard_source(&file);
                return Err(e);
            }
        };

        let pid = process.pid();
        let assigned = state.registry.insert(owner, name.clone(), file.clone(), process)?;
        debug_assert_eq!(assigned, id);

        info!(bot = id, owner, name = %name, file = ?file, pid = ?pid, "bot deployed");

        state.persist();
        self.publish(&state);

        Ok(Deployed { id, name })
    }

    /// Launch and register every qualifying script under `dir`.
    ///
    /// A directory outside the work directory is copied into
    /// `<work_dir>/repo_{dir_name}/` first and the bots run from those copies,
    /// so `stop` never deletes the caller's sources. A directory already inside
    /// the work directory (a repository clone) is used in place. Backing paths
    /// are always spelled from the configured work directory, which makes a
    /// second deployment of the same tree, however it is spelled, a no-op.
    ///
    /// Qualifying means: a regular file with the configured extension that is
    /// not a package marker and is not already backing a record. Files that
    /// fail to launch are logged and skipped. The snapshot is saved once for
    /// the whole batch. Returns how many bots were deployed.
    pub async fn deploy_from_directory(&self, owner: OwnerId, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let source = match self.fs.canonicalize(dir) {
            Ok(resolved) if self.fs.is_dir(&resolved) => resolved,
            _ => {
                return Err(BotkeeperError::Validation(format!(
                    "{:?} is not a directory",
                    dir
                )));
            }
        };
        let label = directory_label(&source)?;
        let layout = self.layout_for(&source, &label)?;

        let entries: Vec<(PathBuf, PathBuf)> = walk_files(self.fs.as_ref(), &source)?
            .into_iter()
            .filter(|file| !(layout.staged && file.starts_with(&layout.work_dir)))
            .filter_map(|file| {
                let rel = file.strip_prefix(&source).ok()?.to_path_buf();
                Some((file, rel))
            })
            .collect();
        if !entries.iter().any(|(file, _)| self.is_deployable(file)) {
            warn!(dir = ?dir, extension = %self.config.launcher.extension, "no scripts to deploy");
        }

        let mut state = self.lock_for_write().await?;
        let fresh_target = layout.staged && !self.fs.exists(&layout.target);

        if layout.staged {
            // Whole tree, so scripts find their helper modules next to them.
            for (file, rel) in &entries {
                let backing = layout.target.join(rel);
                if state.registry.contains_file(&backing) {
                    continue;
                }
                if let Err(e) = self.fs.read(file).and_then(|bytes| self.fs.write(&backing, &bytes)) {
                    warn!(file = ?file, error = %e, "failed to copy file into the work directory");
                }
            }
        }

        let mut deployed = 0usize;
        let mut failed = 0usize;

        for (file, rel) in entries.iter().filter(|(file, _)| self.is_deployable(file)) {
            let backing = layout.target.join(rel);
            if state.registry.contains_file(&backing) {
                warn!(file = ?backing, "file already backs a bot; skipping");
                continue;
            }
            if !self.fs.is_file(&backing) {
                warn!(file = ?file, "script was not staged; skipping");
                failed += 1;
                continue;
            }
            if let Err(e) = state.registry.allocatable_id() {
                error!(error = %e, "cannot assign more bot ids; stopping batch");
                failed += 1;
                break;
            }

            let name = directory_bot_name(&label, rel);
            match self.launcher.launch(&backing, &name) {
                Ok(process) => {
                    let pid = process.pid();
                    let id = state.registry.insert(owner, name.clone(), backing.clone(), process)?;
                    info!(bot = id, owner, name = %name, pid = ?pid, "bot deployed from directory");
                    deployed += 1;
                }
                Err(e) => {
                    warn!(file = ?backing, error = %e, "failed to launch script; skipping");
                    if layout.staged {
                        self.discard_source(&backing);
                    }
                    failed += 1;
                }
            }
        }

        if deployed > 0 {
            state.persist();
            self.publish(&state);
        } else if fresh_target {
            self.discard_clone(&layout.target);
        }

        if deployed == 0 && failed > 0 {
            return Err(BotkeeperError::Process(format!(
                "none of the {failed} scripts under {:?} could be started",
                dir
            )));
        }

        info!(dir = ?dir, target = ?layout.target, deployed, failed, "directory deployment finished");
        Ok(deployed)
    }

    /// Clone `url` into `<work_dir>/repo_{name}` and deploy its scripts.
    ///
    /// The clone runs before the single-writer lock is taken and is bounded
    /// by `[deploy].fetch_timeout`. A failed or useless clone is removed.
    pub async fn deploy_from_repository(&self, owner: OwnerId, url: &str) -> Result<usize> {
        let url = url.trim();
        if url.is_empty() {
            return Err(BotkeeperError::Validation("missing repository url".to_string()));
        }
        if url.starts_with('-') {
            return Err(BotkeeperError::Validation(format!(
                "invalid repository url '{url}'"
            )));
        }
        let name = repo_name(url)?;
        let target = self.config.supervisor.work_dir.join(format!("repo_{name}"));

        if self.state.lock().await.shut_down {
            return Err(BotkeeperError::ShutDown);
        }

        let _reservation = FetchReservation::acquire(&self.fetching, &target)?;
        if self.fs.exists(&target) {
            return Err(BotkeeperError::Validation(format!(
                "repository '{name}' is already deployed at {:?}",
                target
            )));
        }

        info!(owner, url, target = ?target, "fetching repository");
        let target_arg = target.to_string_lossy().into_owned();
        let deploy = &self.config.deploy;
        if let Err(e) = run_bounded(
            &deploy.git,
            &["clone", "--depth", "1", "--", url, target_arg.as_str()],
            None,
            deploy.fetch_timeout,
        )
        .await
        {
            self.discard_clone(&target);
            return Err(e);
        }

        match self.deploy_from_directory(owner, &target).await {
            Ok(0) => {
                warn!(url, "repository contained nothing to deploy; removing clone");
                self.discard_clone(&target);
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.discard_clone(&target);
                Err(e)
            }
        }
    }

    fn single_file_path(&self, id: BotId, owner: OwnerId) -> PathBuf {
        self.config
            .supervisor
            .work_dir
            .join(format!("bot_{id}_{owner}.{}", self.config.launcher.extension))
    }

    fn render_source(&self, content: &str) -> String {
        match &self.config.launcher.source_footer {
            Some(footer) => format!("{}\n\n{}\n", content.trim_end(), footer.trim_end()),
            None => content.to_string(),
        }
    }

    /// Where the files of `source` are backed: in place if it already lives
    /// in the work directory, otherwise a `repo_{label}` copy.
    fn layout_for(&self, source: &Path, label: &str) -> Result<Layout> {
        let configured = &self.config.supervisor.work_dir;
        let work_dir = self.fs.canonicalize(configured)?;

        if let Ok(inside) = source.strip_prefix(&work_dir) {
            return Ok(Layout {
                target: configured.join(inside),
                staged: false,
                work_dir,
            });
        }

        let name = sanitize_name(label).ok_or_else(|| {
            BotkeeperError::Validation(format!("cannot derive a directory name from {:?}", source))
        })?;
        Ok(Layout {
            target: configured.join(format!("repo_{name}")),
            staged: true,
            work_dir,
        })
    }

    fn is_deployable(&self, path: &Path) -> bool {
        let extension = self.config.launcher.extension.as_str();
        let markers = &self.config.deploy.package_markers;

        path.extension().and_then(|e| e.to_str()) == Some(extension)
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_none_or(|n| !markers.iter().any(|m| m == n))
    }

    fn discard_source(&self, file: &Path) {
        if let Err(e) = remove_file_if_exists(self.fs.as_ref(), file) {
            warn!(file = ?file, error = %e, "failed to remove source of failed deployment");
        }
    }

    fn discard_clone(&self, target: &Path) {
        if !self.fs.exists(target) {
            return;
        }
        if let Err(e) = self.fs.remove_dir_all(target) {
            warn!(target = ?target, error = %e, "failed to remove repository clone");
        }
    }
}

/// Display name of a single-source deployment.
pub fn script_name(id: BotId) -> String {
    format!("Script {id}")
}

/// Backing location of a directory deployment.
struct Layout {
    /// Configured-work-dir spelling of the directory the bots run from.
    target: PathBuf,
    /// True when the files are copies of a tree outside the work directory.
    staged: bool,
    /// Canonical work directory.
    work_dir: PathBuf,
}

/// Last component of a canonical directory path.
fn directory_label(dir: &Path) -> Result<String> {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BotkeeperError::Validation(format!("cannot deploy from {:?}", dir)))
}

/// `{dir_name}/{relative/path}` for a file found under a directory.
fn directory_bot_name(label: &str, relative: &Path) -> String {
    let rel: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{label}/{}", rel.join("/"))
}

/// Anything outside `[A-Za-z0-9_-]` replaced by `_`. `None` if nothing
/// meaningful is left.
fn sanitize_name(raw: &str) -> Option<String> {
    let name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '_') {
        None
    } else {
        Some(name)
    }
}

/// Directory-safe name for a repository url: last path segment, `.git`
/// stripped, then sanitized.
pub fn repo_name(url: &str) -> Result<String> {
    let last = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default();
    let last = last.strip_suffix(".git").unwrap_or(last);

    sanitize_name(last).ok_or_else(|| {
        BotkeeperError::Validation(format!("cannot derive a repository name from '{url}'"))
    })
}

/// Marks a clone target as in use until dropped, so two concurrent fetches of
/// the same repository cannot clobber each other's directory.
struct FetchReservation<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    target: PathBuf,
}

impl<'a> FetchReservation<'a> {
    fn acquire(set: &'a Mutex<HashSet<PathBuf>>, target: &Path) -> Result<Self> {
        let mut guard = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !guard.insert(target.to_path_buf()) {
            return Err(BotkeeperError::Validation(format!(
                "repository at {:?} is already being fetched",
                target
            )));
        }
        Ok(Self {
            set,
            target: target.to_path_buf(),
        })
    }
}

impl Drop for FetchReservation<'_> {
    fn drop(&mut self) {
        let mut guard = self.set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.remove(&self.target);
    }
}
