use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use mu_core::InstallError;
use mu_core::payload::is_channel_list_file;

fn placement_error(what: &str, path: &Path, e: impl std::fmt::Display) -> InstallError {
    InstallError::Placement {
        message: format!("{what} {}: {e}", path.display()),
    }
}

fn nothing_to_install(detail: &str) -> InstallError {
    InstallError::Placement {
        message: format!("nothing to install: {detail}"),
    }
}

fn sorted_children(dir: &Path) -> Vec<fs::DirEntry> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)
        .map(|iter| iter.filter_map(Result::ok).collect())
        .unwrap_or_default();
    entries.sort_by_key(|e| e.file_name());
    entries
}

fn picon_child(dir: &Path) -> Option<PathBuf> {
    sorted_children(dir)
        .into_iter()
        .find(|e| e.path().is_dir() && e.file_name().eq_ignore_ascii_case("picon"))
        .map(|e| e.path())
}

/// A `picon` directory (any case) directly under `root`, or under its only
/// entry when that entry is a single wrapper directory. Deeper `picon`
/// directories are ordinary content.
fn find_picon_dir(root: &Path) -> Option<PathBuf> {
    if let Some(dir) = picon_child(root) {
        return Some(dir);
    }

    match sorted_children(root).as_slice() {
        [only] if only.path().is_dir() => picon_child(&only.path()),
        _ => None,
    }
}

/// Move picons into `picon_root` so that image files land directly in it.
pub(super) fn place_picons(extracted: &Path, picon_root: &Path) -> Result<usize, InstallError> {
    let source = find_picon_dir(extracted).unwrap_or_else(|| extracted.to_path_buf());
    debug!(source = %source.display(), dest = %picon_root.display(), "placing picons");

    let moved = move_tree_contents(&source, picon_root)?;
    if moved == 0 {
        return Err(nothing_to_install("archive contains no files"));
    }
    Ok(moved)
}

/// Move everything inside `src` into `dst`, merging directories and
/// overwriting files. Returns the number of files moved.
fn move_tree_contents(src: &Path, dst: &Path) -> Result<usize, InstallError> {
    fs::create_dir_all(dst).map_err(|e| placement_error("cannot create", dst, e))?;

    let mut entries: Vec<fs::DirEntry> = fs::read_dir(src)
        .and_then(|iter| iter.collect::<io::Result<Vec<_>>>())
        .map_err(|e| placement_error("cannot read", src, e))?;
    entries.sort_by_key(|e| e.file_name());

    let mut moved = 0;
    for entry in entries {
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| placement_error("cannot stat", &from, e))?;

        if file_type.is_dir() {
            if to.exists() && !to.is_dir() {
                fs::remove_file(&to).map_err(|e| placement_error("cannot replace", &to, e))?;
            }
            moved += move_tree_contents(&from, &to)?;
        } else {
            if to.is_dir() {
                fs::remove_dir_all(&to).map_err(|e| placement_error("cannot replace", &to, e))?;
            }
            move_file(&from, &to).map_err(|e| placement_error("cannot move", &from, e))?;
            moved += 1;
        }
    }

    Ok(moved)
}

/// Rename, falling back to copy and remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

/// Copy channel-list files found anywhere in `extracted` flat into
/// `channel_root`. Nothing else is copied.
pub(super) fn place_channel_files(
    extracted: &Path,
    channel_root: &Path,
) -> Result<usize, InstallError> {
    let mut copied = 0;

    for entry in WalkDir::new(extracted).sort_by_file_name() {
        let entry = entry.map_err(|e| placement_error("cannot read", extracted, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name();
        if !is_channel_list_file(&name.to_string_lossy()) {
            continue;
        }

        let to = channel_root.join(name);
        fs::copy(entry.path(), &to).map_err(|e| placement_error("cannot copy", entry.path(), e))?;
        debug!(file = %to.display(), "channel file placed");
        copied += 1;
    }

    if copied == 0 {
        return Err(nothing_to_install("archive contains no channel list files"));
    }
    Ok(copied)
}
