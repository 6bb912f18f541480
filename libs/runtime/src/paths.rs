use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Errors for resolving the home directory
#[derive(Debug, thiserror::Error)]
pub enum HomeDirError {
    #[error("HOME environment variable is not set")]
    HomeMissing,
    #[error("APPDATA environment variable is not set")]
    AppDataMissing,
    #[error("home_dir must be an absolute path (after ~ expansion): {0}")]
    AbsoluteRequired(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Expand a leading `~` to the user home directory.
pub fn expand_tilde(raw: &str) -> Result<PathBuf, HomeDirError> {
    let Some(rest) = raw.strip_prefix('~') else {
        return Ok(PathBuf::from(raw));
    };
    let home = user_home()?;
    let rest = rest.trim_start_matches(['/', '\\']);
    if rest.is_empty() {
        Ok(home)
    } else {
        Ok(home.join(rest))
    }
}

#[cfg(target_os = "windows")]
fn user_home() -> Result<PathBuf, HomeDirError> {
    env::var("USERPROFILE")
        .or_else(|_| env::var("HOME"))
        .map(PathBuf::from)
        .map_err(|_| HomeDirError::HomeMissing)
}

#[cfg(not(target_os = "windows"))]
fn user_home() -> Result<PathBuf, HomeDirError> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| HomeDirError::HomeMissing)
}

#[cfg(target_os = "windows")]
fn platform_base() -> Result<PathBuf, HomeDirError> {
    env::var("APPDATA")
        .map(PathBuf::from)
        .map_err(|_| HomeDirError::AppDataMissing)
}

#[cfg(not(target_os = "windows"))]
fn platform_base() -> Result<PathBuf, HomeDirError> {
    user_home()
}

/// Resolve the application home directory.
///
/// - `config_home` given: `~` is expanded and the result must be absolute.
/// - otherwise: `%APPDATA%/<default_subdir>` on Windows, `$HOME/<default_subdir>` elsewhere.
///
/// With `create`, the directory is created when missing.
pub fn resolve_home_dir(
    config_home: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf, HomeDirError> {
    let path = match config_home {
        Some(raw) => {
            let expanded = expand_tilde(&raw)?;
            if !expanded.is_absolute() {
                return Err(HomeDirError::AbsoluteRequired(
                    expanded.to_string_lossy().into(),
                ));
            }
            expanded
        }
        None => platform_base()?.join(default_subdir),
    };

    if create {
        fs::create_dir_all(&path)?;
    }
    Ok(path)
}

/// Join `file` onto `base` unless it is already absolute.
pub fn resolve_under(base: &Path, file: &str) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
