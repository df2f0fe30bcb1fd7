//! Compose projects: locating the stack declaration and reading it.

pub mod volumes;

use std::path::{Path, PathBuf};

use crate::utils::errors::{BackupError, Result};

pub use volumes::{discover_volumes, unnamed_volume_keys, ComposeFile};

/// Declaration filenames recognised in a project directory, in priority order.
pub const DECLARATION_FILES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// A directory holding exactly one stack declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Identity, taken from the directory name
    pub name: String,

    /// Absolute project directory
    pub dir: PathBuf,

    /// Absolute path of the declaration file
    pub compose_file: PathBuf,
}

impl Project {
    /// Resolve a project directory and its declaration file.
    pub fn load(dir: &Path) -> Result<Self> {
        let dir = dir.canonicalize().map_err(|e| {
            BackupError::Configuration(format!(
                "project directory {} is not accessible: {}",
                dir.display(),
                e
            ))
        })?;

        if !dir.is_dir() {
            return Err(BackupError::Configuration(format!(
                "{} is not a directory",
                dir.display()
            )));
        }

        let name = project_identity(&dir)?;
        let compose_file = find_declaration_file(&dir)?;

        Ok(Self {
            name,
            dir,
            compose_file,
        })
    }

    /// Read and parse the declaration file.
    pub fn read_declaration(&self) -> Result<ComposeFile> {
        let content = std::fs::read_to_string(&self.compose_file).map_err(|e| {
            BackupError::Configuration(format!(
                "cannot read {}: {}",
                self.compose_file.display(),
                e
            ))
        })?;
        ComposeFile::parse(&content).map_err(|e| match e {
            BackupError::Configuration(msg) => BackupError::Configuration(format!(
                "{}: {}",
                self.compose_file.display(),
                msg
            )),
            other => other,
        })
    }
}

/// Identity of the project living in `dir` (its final path component).
pub fn project_identity(dir: &Path) -> Result<String> {
    dir.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            BackupError::Configuration(format!(
                "cannot derive a project name from {}",
                dir.display()
            ))
        })
}

/// Locate the single recognised declaration file in `dir`.
pub fn find_declaration_file(dir: &Path) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = DECLARATION_FILES
        .iter()
        .map(|name| dir.join(name))
        .filter(|candidate| candidate.is_file())
        .collect();

    match found.len() {
        0 => Err(BackupError::Configuration(format!(
            "no compose file found in {} (tried: {})",
            dir.display(),
            DECLARATION_FILES.join(", ")
        ))),
        1 => Ok(found.remove(0)),
        _ => Err(BackupError::Configuration(format!(
            "ambiguous compose files in {}: {}",
            dir.display(),
            found
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_project() -> std::io::Result<()> {
        let root = TempDir::new()?;
        let dir = root.path().join("wiki");
        fs::create_dir(&dir)?;
        fs::write(dir.join("compose.yaml"), "services: {}\n")?;

        let project = Project::load(&dir).unwrap();
        assert_eq!(project.name, "wiki");
        assert_eq!(project.compose_file.file_name().unwrap(), "compose.yaml");
        assert!(project.dir.is_absolute());
        Ok(())
    }

    #[test]
    fn test_missing_declaration() -> std::io::Result<()> {
        let root = TempDir::new()?;
        fs::write(root.path().join("README.md"), "nothing here")?;

        let err = find_declaration_file(root.path()).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
        Ok(())
    }

    #[test]
    fn test_ambiguous_declaration() -> std::io::Result<()> {
        let root = TempDir::new()?;
        fs::write(root.path().join("docker-compose.yml"), "services: {}\n")?;
        fs::write(root.path().join("compose.yaml"), "services: {}\n")?;

        let err = find_declaration_file(root.path()).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
        Ok(())
    }

    #[test]
    fn test_missing_directory() {
        let err = Project::load(Path::new("/nonexistent/project")).unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
    }

    #[test]
    fn test_unparsable_declaration() -> std::io::Result<()> {
        let root = TempDir::new()?;
        fs::write(root.path().join("compose.yml"), "services: [unclosed\n")?;

        let project = Project::load(root.path()).unwrap();
        let err = project.read_declaration().unwrap_err();
        assert!(matches!(err, BackupError::Configuration(_)));
        Ok(())
    }
}
