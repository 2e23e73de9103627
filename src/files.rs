use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes `contents` to `path` unless the file already exists.
///
/// Returns `Ok(false)` when an existing file was left untouched. A failed write removes the
/// partially written file so the next attempt starts clean.
pub(crate) fn write_if_absent(path: &Path, contents: &str) -> io::Result<bool> {
    create_with(path, |file| {
        file.write_all(contents.as_bytes())?;
        file.flush()
    })
}

fn create_with(path: &Path, fill: impl FnOnce(&mut File) -> io::Result<()>) -> io::Result<bool> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err),
    };

    if let Err(err) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial file");
        }
        return Err(err);
    }
    Ok(true)
}
