//! Content digest of a directory tree.

use std::fs;
use std::path::Path;

use anyhow::Context;

/// blake3 digest over every file's relative path and content.
///
/// Paths are visited in sorted order and use `/` separators, so equal trees
/// hash equally regardless of creation order. Directories contribute their
/// path with a distinct marker byte, so empty directories count.
pub fn hash_tree(root: &Path) -> anyhow::Result<String> {
    let mut hasher = blake3::Hasher::new();
    visit(&mut hasher, root, "")?;
    Ok(hasher.finalize().to_hex().to_string())
}

fn visit(hasher: &mut blake3::Hasher, dir: &Path, prefix: &str) -> anyhow::Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };
        let path = entry.path();
        let meta = fs::metadata(&path).with_context(|| format!("Failed to stat: {}", path.display()))?;

        hasher.update(relative.as_bytes());
        if meta.is_dir() {
            hasher.update(&[0x01]);
            visit(hasher, &path, &relative)?;
        } else {
            hasher.update(&[0x00]);
            let content =
                fs::read(&path).with_context(|| format!("Failed to read: {}", path.display()))?;
            hasher.update(&(content.len() as u64).to_le_bytes());
            hasher.update(&content);
        }
    }
    Ok(())
}
