//! Snapshots of previous template output.
//!
//! Before the composer overwrites an existing template directory, the current
//! templates and every environment's parameter file are copied into a fresh
//! timestamp-named folder under the backup root. Snapshots are staged in a
//! hidden folder and renamed into place once complete, so a folder with a
//! timestamp name is always a full copy.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use armada_core::OrchestratorConfig;

use crate::error::{ArmError, ArmResult};

/// Sub-folder of a snapshot holding template files.
pub const TEMPLATES_FOLDER: &str = "templates";
/// Sub-folder of a snapshot holding parameter files.
pub const PARAMETERS_FOLDER: &str = "parameters";

/// A completed snapshot.
#[derive(Debug, Clone)]
pub struct BackupSnapshot {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
    /// Template files copied, relative to the template root.
    pub templates: Vec<PathBuf>,
    /// Parameter file names copied.
    pub parameters: Vec<String>,
}

/// Takes snapshots of a project's template output.
#[derive(Debug, Clone)]
pub struct BackupManager {
    template_dir: PathBuf,
    backup_dir: PathBuf,
    parameter_dir: PathBuf,
    parameter_glob: String,
}

impl BackupManager {
    pub fn new(project_root: &Path, config: &OrchestratorConfig) -> Self {
        Self {
            template_dir: project_root.join(&config.template_dir),
            backup_dir: project_root.join(&config.backup_dir),
            parameter_dir: project_root.join(&config.parameter_dir),
            parameter_glob: config.parameter_file_glob(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the current output, if there is any.
    ///
    /// Returns `None` for a fresh project or when the backup root is the
    /// template root itself. Symlinked files are copied by content. Any file
    /// that cannot be listed or copied fails the snapshot, and nothing is
    /// left behind under a timestamp name.
    pub fn snapshot(&self) -> ArmResult<Option<BackupSnapshot>> {
        if self.backup_dir == self.template_dir {
            warn!("Backup directory equals template directory, skipping backup");
            return Ok(None);
        }

        let templates = self.existing_templates()?;
        if templates.is_empty() {
            debug!("No previous templates at {:?}, nothing to back up", self.template_dir);
            return Ok(None);
        }
        let parameters = self.parameter_files()?;

        self.stage(templates, &parameters).map(Some)
    }

    /// Copy `templates` and `parameters` into a staging folder and publish it.
    fn stage(&self, templates: Vec<PathBuf>, parameters: &[PathBuf]) -> ArmResult<BackupSnapshot> {
        let created_at = Local::now();
        fs::create_dir_all(&self.backup_dir).map_err(|e| self.failure(&self.backup_dir, e))?;
        let name = self.unique_name(&created_at);
        let staging = self.backup_dir.join(format!(".{}.partial", name));

        match self.copy_into(&staging, &templates, parameters) {
            Ok(copied) => {
                let target = self.backup_dir.join(&name);
                fs::rename(&staging, &target).map_err(|e| {
                    let _ = fs::remove_dir_all(&staging);
                    self.failure(&target, e)
                })?;
                info!(
                    "Backed up {} template file(s) and {} parameter file(s) to {:?}",
                    templates.len(),
                    copied.len(),
                    target
                );
                Ok(BackupSnapshot {
                    path: target,
                    created_at,
                    templates,
                    parameters: copied,
                })
            }
            Err(e) => {
                if !staging.exists() {
                    return Err(e);
                }
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    warn!("Could not remove partial backup {:?}: {}", staging, cleanup);
                }
                Err(e)
            }
        }
    }

    /// Files under the template root, relative to it, skipping the backup root.
    fn existing_templates(&self) -> ArmResult<Vec<PathBuf>> {
        if !self.template_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.template_dir)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.path() != self.backup_dir.as_path());
        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(self.template_dir.as_path()).to_path_buf();
                ArmError::Backup {
                    path,
                    message: e.to_string(),
                }
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&self.template_dir) {
                files.push(relative.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn copy_into(&self, staging: &Path, templates: &[PathBuf], parameters: &[PathBuf]) -> ArmResult<Vec<String>> {
        let template_target = staging.join(TEMPLATES_FOLDER);
        for relative in templates {
            let source = self.template_dir.join(relative);
            let target = template_target.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| self.failure(parent, e))?;
            }
            fs::copy(&source, &target).map_err(|e| self.failure(&source, e))?;
        }

        let parameter_target = staging.join(PARAMETERS_FOLDER);
        fs::create_dir_all(&parameter_target).map_err(|e| self.failure(&parameter_target, e))?;

        let mut copied = Vec::new();
        for source in parameters {
            let Some(name) = source.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            fs::copy(source, parameter_target.join(&name)).map_err(|e| self.failure(source, e))?;
            copied.push(name);
        }
        Ok(copied)
    }

    fn parameter_files(&self) -> ArmResult<Vec<PathBuf>> {
        let pattern = self.parameter_dir.join(&self.parameter_glob);
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|e| ArmError::Backup {
            path: self.parameter_dir.clone(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| ArmError::Backup {
                path: e.path().to_path_buf(),
                message: e.error().to_string(),
            })?;
            let metadata = fs::metadata(&path).map_err(|e| self.failure(&path, e))?;
            if metadata.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Timestamp name not yet used under the backup root.
    fn unique_name(&self, created_at: &DateTime<Local>) -> String {
        let base = created_at.format("%Y%m%d%H%M%S%3f").to_string();
        let taken = |name: &str| {
            self.backup_dir.join(name).exists()
                || self.backup_dir.join(format!(".{}.partial", name)).exists()
        };

        if !taken(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}-{}", base, n))
            .find(|name| !taken(name))
            .unwrap_or(base)
    }

    fn failure(&self, path: &Path, error: std::io::Error) -> ArmError {
        ArmError::Backup {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn manager(root: &Path) -> BackupManager {
        BackupManager::new(root, &OrchestratorConfig::default())
    }

    #[test]
    fn test_no_snapshot_for_fresh_project() {
        let dir = tempdir().unwrap();
        assert!(manager(dir.path()).snapshot().unwrap().is_none());
        assert!(!dir.path().join("templates/backup").exists());
    }

    #[test]
    fn test_snapshot_copies_templates_and_parameters() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("templates/azure/provision")).unwrap();
        fs::create_dir_all(root.join(".fx/configs")).unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "mocked main.bicep file").unwrap();
        fs::write(root.join("templates/azure/provision/web.bicep"), "web").unwrap();
        fs::write(root.join(".fx/configs/azure.parameters.dev.json"), "{}").unwrap();
        fs::write(root.join(".fx/configs/config.dev.json"), "{}").unwrap();

        let snapshot = manager(root).snapshot().unwrap().unwrap();

        assert_eq!(
            fs::read_to_string(snapshot.path.join("templates/main.bicep")).unwrap(),
            "mocked main.bicep file"
        );
        assert!(snapshot.path.join("templates/provision/web.bicep").exists());
        assert_eq!(snapshot.parameters, vec!["azure.parameters.dev.json"]);
        assert!(!snapshot.path.join("parameters/config.dev.json").exists());

        let entries: Vec<_> = fs::read_dir(root.join("templates/backup")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_unique_name_suffixes_collisions() {
        let dir = tempdir().unwrap();
        let manager = manager(dir.path());
        let now = Local::now();
        let base = now.format("%Y%m%d%H%M%S%3f").to_string();

        fs::create_dir_all(manager.backup_dir().join(&base)).unwrap();
        assert_eq!(manager.unique_name(&now), format!("{}-1", base));

        fs::create_dir_all(manager.backup_dir().join(format!("{}-1", base))).unwrap();
        assert_eq!(manager.unique_name(&now), format!("{}-2", base));
    }

    #[test]
    fn test_failed_copy_leaves_no_partial_folder() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("templates/azure")).unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "current").unwrap();
        let manager = manager(root);

        let templates = vec![PathBuf::from("main.bicep"), PathBuf::from("provision/gone.bicep")];
        let err = manager.stage(templates, &[]).unwrap_err();

        assert!(matches!(err, ArmError::Backup { ref path, .. } if path.ends_with("gone.bicep")));
        let leftovers: Vec<_> = fs::read_dir(manager.backup_dir()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_template_is_copied_by_content() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("templates/azure")).unwrap();
        fs::create_dir_all(root.join("shared")).unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "current").unwrap();
        fs::write(root.join("shared/identity.bicep"), "shared identity").unwrap();
        std::os::unix::fs::symlink(
            root.join("shared/identity.bicep"),
            root.join("templates/azure/identity.bicep"),
        )
        .unwrap();

        let snapshot = manager(root).snapshot().unwrap().unwrap();

        assert_eq!(
            snapshot.templates,
            vec![PathBuf::from("identity.bicep"), PathBuf::from("main.bicep")]
        );
        assert_eq!(
            fs::read_to_string(snapshot.path.join("templates/identity.bicep")).unwrap(),
            "shared identity"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_template_entry_fails_snapshot() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("templates/azure")).unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "current").unwrap();
        std::os::unix::fs::symlink(
            root.join("nowhere.bicep"),
            root.join("templates/azure/dangling.bicep"),
        )
        .unwrap();

        let err = manager(root).snapshot().unwrap_err();

        assert!(matches!(err, ArmError::Backup { .. }));
        assert!(!root.join("templates/backup").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_parameter_file_fails_snapshot() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("templates/azure")).unwrap();
        fs::create_dir_all(root.join(".fx/configs")).unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "current").unwrap();
        std::os::unix::fs::symlink(
            root.join("missing.json"),
            root.join(".fx/configs/azure.parameters.dev.json"),
        )
        .unwrap();

        let err = manager(root).snapshot().unwrap_err();

        assert!(
            matches!(err, ArmError::Backup { ref path, .. } if path.ends_with("azure.parameters.dev.json"))
        );
        assert!(!root.join("templates/backup").exists());
    }

    #[test]
    fn test_nested_backup_dir_is_not_copied() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let config = OrchestratorConfig::default().with_backup_dir("templates/azure/.backup");
        fs::create_dir_all(root.join("templates/azure/.backup/old")).unwrap();
        fs::write(root.join("templates/azure/.backup/old/main.bicep"), "old").unwrap();
        fs::write(root.join("templates/azure/main.bicep"), "current").unwrap();

        let snapshot = BackupManager::new(root, &config).snapshot().unwrap().unwrap();
        assert_eq!(snapshot.templates, vec![PathBuf::from("main.bicep")]);
    }
}
