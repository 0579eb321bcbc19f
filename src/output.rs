use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{SetupError, io_err};

pub const TEMPLATE_DIR: &str = "templates";
pub const OUTPUT_DIR: &str = "generated";
pub const OVERVIEW_FILE: &str = "overview.svg";
pub const LANGUAGES_FILE: &str = "languages.svg";

#[cfg(unix)]
const OUTPUT_DIR_MODE: u32 = 0o777;

/// Where templates are read from and badges are written to.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self::rooted(".")
    }
}

impl Layout {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join(TEMPLATE_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn template(&self, file: &str) -> PathBuf {
        self.template_dir().join(file)
    }

    pub fn output(&self, file: &str) -> PathBuf {
        self.output_dir().join(file)
    }
}

/// Create the output directory if it does not already exist.
pub fn ensure_output_directory(layout: &Layout) -> Result<(), SetupError> {
    let dir = layout.output_dir();
    if dir.is_dir() {
        tracing::debug!("directory already exists: {}", dir.display());
        return Ok(());
    }

    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    set_dir_permissions(&dir)?;
    tracing::info!("created directory: {}", dir.display());
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SetupError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(OUTPUT_DIR_MODE))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SetupError> {
    Ok(())
}

/// Check that both templates are readable and the output directory is writable.
pub fn check_permissions(layout: &Layout) -> Result<(), SetupError> {
    let template_dir = layout.template_dir();
    if !template_dir.is_dir() {
        return Err(SetupError::MissingDirectory { path: template_dir });
    }

    let templates = [
        layout.template(OVERVIEW_FILE),
        layout.template(LANGUAGES_FILE),
    ];
    for path in &templates {
        if !path.is_file() {
            return Err(SetupError::MissingFile { path: path.clone() });
        }
    }
    for path in templates {
        if File::open(&path).is_err() {
            return Err(SetupError::Permission {
                action: "read",
                path,
            });
        }
    }

    let output_dir = layout.output_dir();
    if !can_write_in(&output_dir) {
        return Err(SetupError::Permission {
            action: "write to",
            path: output_dir,
        });
    }

    Ok(())
}

/// Whether this process can create files in `dir`; mode bits alone ignore ownership.
fn can_write_in(dir: &Path) -> bool {
    // The scratch file is removed when dropped
    dir.is_dir() && tempfile::NamedTempFile::new_in(dir).is_ok()
}

/// Write a finished badge, creating the output directory first if needed.
pub fn write_badge(layout: &Layout, file: &str, content: &str) -> Result<PathBuf, SetupError> {
    ensure_output_directory(layout)?;
    let path = layout.output(file);
    fs::write(&path, content).map_err(|e| io_err(&path, e))?;
    tracing::info!("generated file: {}", path.display());
    Ok(path)
}
