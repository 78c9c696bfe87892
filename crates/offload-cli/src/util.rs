//! Process-environment helpers.

use std::io;

use camino::Utf8PathBuf;

/// Resolves the wrapper's current working directory.
///
/// The directory travels to the daemon, which resolves the request's
/// relative paths against it, so a non-UTF-8 path is an error rather than a
/// lossy conversion.
pub fn current_dir() -> io::Result<Utf8PathBuf> {
    let dir = std::env::current_dir()?;
    Utf8PathBuf::from_path_buf(dir).map_err(|dir| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("current directory '{}' is not valid UTF-8", dir.display()),
        )
    })
}

/// Reads an environment variable, treating empty or blank values as unset.
#[must_use]
pub fn read_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

/// Creates a unique temporary file with the given suffix and returns its
/// path. Creation is atomic; the file persists until the caller removes it.
pub fn create_temp_file(suffix: &str) -> io::Result<Utf8PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("offload-")
        .suffix(suffix)
        .tempfile()?;
    let (_, path) = file.keep().map_err(|persist| persist.error)?;
    Utf8PathBuf::from_path_buf(path).map_err(|path| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("temporary path '{}' is not valid UTF-8", path.display()),
        )
    })
}
