//! Merge-copy of directory trees.

use std::fs;
use std::path::Path;

use anyhow::Context;

/// Copy `src` into `dst` recursively.
///
/// Existing files are overwritten; files in `dst` that are absent from `src`
/// are left alone. Returns the number of files copied.
pub fn merge_copy(src: &Path, dst: &Path) -> anyhow::Result<usize> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory: {}", dst.display()))?;

    let mut copied = 0;
    for entry in
        fs::read_dir(src).with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        // Follows symlinks so the copy is self-contained.
        let meta = fs::metadata(&from)
            .with_context(|| format!("Failed to stat: {}", from.display()))?;
        if meta.is_dir() {
            copied += merge_copy(&from, &to)?;
        } else {
            fs::copy(&from, &to).with_context(|| {
                format!("Failed to copy {} to {}", from.display(), to.display())
            })?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Sorted entry names of `dir`, directories suffixed with `/`.
pub fn list_dir(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}
