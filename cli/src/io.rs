use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CliError;

/// Resolve where the produced file goes.
///
/// Without `output` the file lands next to the input under `file_name`.
/// An existing directory receives `file_name`; anything else is taken as the
/// exact destination.
pub fn resolve_output(input: &Path, output: Option<&Path>, file_name: &str) -> PathBuf {
    match output {
        None => input.with_file_name(file_name),
        Some(out) if out.is_dir() => out.join(file_name),
        Some(out) => out.to_path_buf(),
    }
}

/// Like [`resolve_output`], but never hands back the input path itself.
pub fn checked_output(input: &Path, output: Option<&Path>, file_name: &str) -> Result<PathBuf, CliError> {
    let resolved = resolve_output(input, output, file_name);
    if output.is_none() && resolved == input {
        return Err(CliError::WouldOverwrite(resolved));
    }
    Ok(resolved)
}

/// Read file contents.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    fs::read(path).map_err(|e| CliError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write file contents, creating parent directories as needed.
pub fn write_file(path: &Path, data: &[u8]) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CliError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, data).map_err(|e| CliError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}
