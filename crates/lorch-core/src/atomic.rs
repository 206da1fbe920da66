// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic, owner-only durable writes (Invariant 3): write
//! `.tmp.<pid>.<rand>` beside the target with mode 0600, fsync it, rename
//! over the target, then fsync the parent directory so the rename itself
//! survives a crash.

use std::fs::File;
use std::io::Write;
use std::path::Path;

#[cfg(unix)]
fn set_owner_only(file: &File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn ensure_owner_only_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn ensure_owner_only_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Creates `dir` (and parents) as an owner-only (0700) directory if it
/// doesn't already exist.
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    ensure_owner_only_dir(dir)
}

/// Atomically writes `bytes` to `path`. `path`'s parent directory must
/// already exist (use [`ensure_dir`] first).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent directory")
    })?;
    let tmp_name = format!(
        ".tmp.{}.{}",
        std::process::id(),
        nanoid::nanoid!(8, &['0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f'])
    );
    let tmp_path = dir.join(tmp_name);

    {
        let mut file = File::create(&tmp_path)?;
        set_owner_only(&file)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }

    Ok(())
}

/// Atomically writes `value` serialized as (non-canonical, human-diffable)
/// pretty JSON to `path`. Used for run state, receipts, and snapshot
/// manifests — none of which participate in the idempotency key, so
/// pretty-printing them costs nothing.
pub fn write_atomic_json<T: serde::Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_atomic(path, &bytes)
}
