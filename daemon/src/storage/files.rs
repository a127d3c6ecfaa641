use log::debug;
use mcsm_protocol::backup::CopyFailure;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Result of a tolerant tree copy.
#[derive(Debug, Default)]
pub struct CopyReport {
    pub files: u64,
    pub bytes: u64,
    pub failures: Vec<CopyFailure>,
}

impl CopyReport {
    fn fail(&mut self, path: &Path, err: impl ToString) {
        self.failures.push(CopyFailure {
            path: path.to_path_buf(),
            reason: err.to_string(),
        });
    }
}

/// Copies a file or a directory tree from `src` to `dst`.
///
/// Errors are recorded per file and copying continues with the next one.
pub fn copy_tree(src: &Path, dst: &Path, report: &mut CopyReport) {
    let metadata = match fs::metadata(src) {
        Ok(metadata) => metadata,
        Err(err) => return report.fail(src, err),
    };

    if metadata.is_file() {
        if let Some(parent) = dst.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                return report.fail(src, err);
            }
        }
        match fs::copy(src, dst) {
            Ok(bytes) => {
                report.files += 1;
                report.bytes += bytes;
            }
            Err(err) => report.fail(src, err),
        }
        return;
    }

    if let Err(err) = fs::create_dir_all(dst) {
        return report.fail(src, err);
    }
    let entries = match fs::read_dir(src) {
        Ok(entries) => entries,
        Err(err) => return report.fail(src, err),
    };
    for entry in entries {
        match entry {
            Ok(entry) => copy_tree(&entry.path(), &dst.join(entry.file_name()), report),
            Err(err) => report.fail(src, err),
        }
    }
}

/// Removes a file or a whole directory; a missing path is not an error.
pub fn remove_entry(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Whether `path` lies inside `root` once both are made absolute and `..` is resolved.
pub fn is_within(path: &Path, root: &Path) -> bool {
    match (std::path::absolute(path), std::path::absolute(root)) {
        (Ok(path), Ok(root)) => normalize(&path).starts_with(normalize(&root)),
        _ => false,
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Picks the server jar in `dir`: `server.jar` first, then a jar whose name
/// mentions `server` or `minecraft`, then any jar. Names are compared
/// case-insensitively and candidates are ordered by name.
pub fn find_server_jar(dir: &Path) -> Option<PathBuf> {
    let mut jars: Vec<(String, PathBuf)> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_lowercase();
            name.ends_with(".jar").then(|| (name, entry.path()))
        })
        .collect();
    jars.sort();

    let found = jars
        .iter()
        .find(|(name, _)| name == "server.jar")
        .or_else(|| {
            jars.iter()
                .find(|(name, _)| name.contains("server") || name.contains("minecraft"))
        })
        .or_else(|| jars.first())
        .map(|(_, path)| path.clone());
    debug!("server jar in {:?}: {:?}", dir, found);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_nested_trees() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("world");
        fs::create_dir_all(src.join("region")).unwrap();
        fs::write(src.join("level.dat"), b"level").unwrap();
        fs::write(src.join("region").join("r.0.0.mca"), b"chunks").unwrap();

        let mut report = CopyReport::default();
        let dst = dir.path().join("copy").join("world");
        copy_tree(&src, &dst, &mut report);

        assert!(report.failures.is_empty());
        assert_eq!(report.files, 2);
        assert_eq!(report.bytes, 11);
        assert_eq!(fs::read(dst.join("region").join("r.0.0.mca")).unwrap(), b"chunks");
    }

    #[test]
    fn missing_source_is_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = CopyReport::default();
        copy_tree(&dir.path().join("nope"), &dir.path().join("dst"), &mut report);
        assert_eq!(report.files, 0);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn remove_entry_handles_files_dirs_and_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        let tree = dir.path().join("tree");
        fs::write(&file, b"a").unwrap();
        fs::create_dir_all(tree.join("inner")).unwrap();

        remove_entry(&file).unwrap();
        remove_entry(&tree).unwrap();
        remove_entry(&dir.path().join("missing")).unwrap();
        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[test]
    fn containment_resolves_parent_components() {
        let root = Path::new("/srv/backups");
        assert!(is_within(Path::new("/srv/backups/alpha/backup-1"), root));
        assert!(!is_within(Path::new("/srv/backups/../world"), root));
        assert!(!is_within(Path::new("/srv/other"), root));
    }

    #[test]
    fn server_jar_preference() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(find_server_jar(dir.path()), None);

        fs::write(dir.path().join("aaa-lib.jar"), b"").unwrap();
        assert_eq!(find_server_jar(dir.path()), Some(dir.path().join("aaa-lib.jar")));

        fs::write(dir.path().join("paper-minecraft-1.20.jar"), b"").unwrap();
        assert_eq!(
            find_server_jar(dir.path()),
            Some(dir.path().join("paper-minecraft-1.20.jar"))
        );

        fs::write(dir.path().join("Server.jar"), b"").unwrap();
        assert_eq!(find_server_jar(dir.path()), Some(dir.path().join("Server.jar")));
    }
}
