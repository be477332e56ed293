//! Archive extraction and package folder lookup.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::RemoteError;

/// Extracts the zip at `archive` into `dest`. Entries that would escape
/// `dest` are skipped. Returns the number of files written.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, RemoteError> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;

        let Some(relative) = entry.enclosed_name() else {
            warn!("[ARCHIVE] Skipping unsafe entry '{}'", entry.name());
            continue;
        };
        let outpath = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;
        written += 1;
    }

    info!(
        "[ARCHIVE] Extracted {} file(s) from {} into {}",
        written,
        archive.display(),
        dest.display()
    );
    Ok(written)
}

/// Returns the single top-level directory of an extracted tree.
///
/// Archives of a branch or tag contain exactly one folder named after the
/// repository and ref. When several exist the first by name is used.
pub fn top_level_dir(root: &Path) -> Result<PathBuf, RemoteError> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    if dirs.len() > 1 {
        warn!(
            "[ARCHIVE] {} top-level folders in {}, using the first",
            dirs.len(),
            root.display()
        );
    }

    dirs.into_iter()
        .next()
        .ok_or_else(|| RemoteError::PackageFolderNotFound {
            searched: root.to_path_buf(),
            target: "top-level folder".to_string(),
        })
}

/// Resolves a declared subpath inside the archive's top-level folder.
pub fn locate_subpath(root: &Path, subpath: &str) -> Result<PathBuf, RemoteError> {
    let not_found = || RemoteError::PackageFolderNotFound {
        searched: root.to_path_buf(),
        target: subpath.to_string(),
    };

    let relative = Path::new(subpath.trim_matches('/'));
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe || relative.as_os_str().is_empty() {
        warn!("[ARCHIVE] Rejecting subpath '{}'", subpath);
        return Err(not_found());
    }

    let candidate = top_level_dir(root)?.join(relative);
    if candidate.is_dir() {
        debug!("[ARCHIVE] Subpath resolved to {}", candidate.display());
        Ok(candidate)
    } else {
        Err(not_found())
    }
}

/// Searches `root` for directories whose name ends in `suffix`.
///
/// A folder named exactly `<name><suffix>` wins; otherwise the first match
/// in traversal order (depth-first, entries sorted by name) is returned.
pub fn find_package_folder(root: &Path, name: &str, suffix: &str) -> Result<PathBuf, RemoteError> {
    let exact = format!("{}{}", name, suffix);

    let matches: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            let file_name = entry.file_name().to_string_lossy();
            file_name.len() > suffix.len() && file_name.ends_with(suffix)
        })
        .map(|entry| entry.into_path())
        .collect();

    debug!(
        "[ARCHIVE] {} candidate folder(s) ending in '{}'",
        matches.len(),
        suffix
    );

    let exact_match = matches
        .iter()
        .find(|path| path.file_name().is_some_and(|n| n.to_string_lossy() == exact));

    exact_match
        .or_else(|| matches.first())
        .cloned()
        .ok_or_else(|| RemoteError::PackageFolderNotFound {
            searched: root.to_path_buf(),
            target: format!("*{}", suffix),
        })
}

/// Removes `dir` and everything in it, then recreates it empty.
pub fn flush_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const SUFFIX: &str = ".roboFontExt";

    fn make_tree(root: &Path, dirs: &[&str]) {
        for dir in dirs {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
    }

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("master.zip");
        write_zip(
            &archive,
            &[
                ("repo-master/README.md", "hi"),
                ("repo-master/MyPkg.roboFontExt/info.plist", "<plist/>"),
            ],
        );

        let dest = dir.path().join("out");
        let written = extract_zip(&archive, &dest).unwrap();

        assert_eq!(written, 2);
        assert!(dest.join("repo-master/MyPkg.roboFontExt/info.plist").is_file());
    }

    #[test]
    fn test_extract_skips_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escape.txt", "x"), ("ok/file.txt", "y")]);

        let dest = dir.path().join("out");
        let written = extract_zip(&archive, &dest).unwrap();

        assert_eq!(written, 1);
        assert!(!dir.path().join("escape.txt").exists());
        assert!(dest.join("ok/file.txt").exists());
    }

    #[test]
    fn test_extract_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let archive = dir.path().join("broken.zip");
        fs::write(&archive, "not a zip").unwrap();
        assert!(matches!(
            extract_zip(&archive, &dir.path().join("out")),
            Err(RemoteError::Archive(_))
        ));
    }

    #[test]
    fn test_locate_subpath() {
        let dir = TempDir::new().unwrap();
        make_tree(dir.path(), &["repo-master/Sub/MyPkg.roboFontExt"]);

        let found = locate_subpath(dir.path(), "Sub/MyPkg.roboFontExt").unwrap();
        assert_eq!(found, dir.path().join("repo-master/Sub/MyPkg.roboFontExt"));
    }

    #[test]
    fn test_locate_subpath_missing_or_unsafe() {
        let dir = TempDir::new().unwrap();
        make_tree(dir.path(), &["repo-master/Other"]);

        for subpath in ["Sub/MyPkg.roboFontExt", "../repo-master", "/", ""] {
            assert!(
                matches!(
                    locate_subpath(dir.path(), subpath),
                    Err(RemoteError::PackageFolderNotFound { .. })
                ),
                "expected failure for {:?}",
                subpath
            );
        }
    }

    #[test]
    fn test_find_prefers_exact_name() {
        let dir = TempDir::new().unwrap();
        make_tree(
            dir.path(),
            &["repo-master/Foo.roboFontExt", "repo-master/MyPkg.roboFontExt"],
        );

        let found = find_package_folder(dir.path(), "MyPkg", SUFFIX).unwrap();
        assert_eq!(found, dir.path().join("repo-master/MyPkg.roboFontExt"));
    }

    #[test]
    fn test_find_falls_back_to_first_match() {
        let dir = TempDir::new().unwrap();
        make_tree(
            dir.path(),
            &["repo-master/b/Zed.roboFontExt", "repo-master/a/Foo.roboFontExt"],
        );

        let found = find_package_folder(dir.path(), "MyPkg", SUFFIX).unwrap();
        assert_eq!(found, dir.path().join("repo-master/a/Foo.roboFontExt"));
    }

    #[test]
    fn test_find_ignores_files_and_bare_suffix() {
        let dir = TempDir::new().unwrap();
        make_tree(dir.path(), &["repo-master/.roboFontExt"]);
        fs::write(dir.path().join("repo-master/File.roboFontExt"), "x").unwrap();

        assert!(matches!(
            find_package_folder(dir.path(), "MyPkg", SUFFIX),
            Err(RemoteError::PackageFolderNotFound { .. })
        ));
    }

    #[test]
    fn test_top_level_dir_empty() {
        let dir = TempDir::new().unwrap();
        assert!(top_level_dir(dir.path()).is_err());
    }

    #[test]
    fn test_flush_dir() {
        let dir = TempDir::new().unwrap();
        let scratch = dir.path().join("scratch");
        make_tree(&scratch, &["stale/folder"]);

        flush_dir(&scratch).unwrap();

        assert!(scratch.is_dir());
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }
}
