use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::glob::{split_glob_base, Glob};

/// Lists the files matching `pattern`.
///
/// The walk starts at the literal directory prefix of `pattern`; the rest of the pattern and the
/// `exclude` globs are matched against `/`-separated paths relative to that directory. Excluded
/// directories are not descended into, and unreadable directories are skipped. A pattern without
/// glob metacharacters is returned as is, without touching the file system.
pub fn search<I, S>(pattern: &str, exclude: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let Some((base, rest)) = split_glob_base(pattern) else {
        return Ok(vec![PathBuf::from(pattern)]);
    };
    let base = match base {
        "" if pattern.starts_with(['/', '\\']) => PathBuf::from(&pattern[..1]),
        "" => PathBuf::from("."),
        base => PathBuf::from(base),
    };

    let include = Glob::new(&rest.replace('\\', "/"))?;
    let exclude = Glob::from_patterns(exclude)?;

    let mut out = Vec::new();
    walk(&base, "", &include, &exclude, &mut out);
    out.sort();
    Ok(out)
}

fn walk(dir: &Path, relative: &str, include: &Glob, exclude: &Glob, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(
                target = "tessera.vfs",
                dir = %dir.display(),
                error = %err,
                "skipping unreadable directory"
            );
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let child = if relative.is_empty() {
            name.to_string()
        } else {
            format!("{relative}/{name}")
        };
        if exclude.is_match(&child) {
            continue;
        }

        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&entry.path(), &child, include, exclude, out);
        } else if include.is_match(&child) {
            out.push(entry.path());
        }
    }
}
