use log::debug;
use mcsm_protocol::management::instance::BackupExtras;
use std::fs;
use std::path::Path;

use super::naming::MANIFEST_FILE;
use crate::storage::ServerProperties;

const DIMENSION_SUFFIXES: [&str; 2] = ["_nether", "_the_end"];

/// Top-level entries of a server directory that make up one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPlan {
    pub entries: Vec<String>,
    /// No world directory was found; `entries` is the whole server directory.
    pub full_copy: bool,
}

/// A directory that holds chunk data.
pub fn is_world_dir(path: &Path) -> bool {
    path.join("region").is_dir() || path.join("level.dat").is_file()
}

fn is_excluded(name: &str, infrastructure: &[String]) -> bool {
    name.starts_with('.')
        || name.to_ascii_lowercase().ends_with(".jar")
        || infrastructure.iter().any(|n| n == name)
}

fn sorted_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(_) => vec![],
    };
    names.sort();
    names
}

/// The configured level, or the first directory by name holding a `region` folder.
fn base_world(server_dir: &Path, infrastructure: &[String]) -> Option<String> {
    let level = ServerProperties::load_from_server(server_dir)
        .map(|props| props.level_name())
        .unwrap_or_else(|_| "world".to_owned());
    if server_dir.join(&level).is_dir() {
        return Some(level);
    }
    sorted_names(server_dir)
        .into_iter()
        .filter(|name| !is_excluded(name, infrastructure))
        .find(|name| server_dir.join(name).join("region").is_dir())
}

pub fn resolve(server_dir: &Path, extras: &BackupExtras, infrastructure: &[String]) -> BackupPlan {
    let Some(base) = base_world(server_dir, infrastructure) else {
        let entries = sorted_names(server_dir)
            .into_iter()
            .filter(|name| !is_excluded(name, infrastructure))
            .collect();
        debug!("no world directory in {:?}, copying everything", server_dir);
        return BackupPlan {
            entries,
            full_copy: true,
        };
    };

    let mut entries = vec![base.clone()];
    for suffix in DIMENSION_SUFFIXES {
        let companion = format!("{}{}", base, suffix);
        if server_dir.join(&companion).is_dir() {
            entries.push(companion);
        }
    }
    for extra in extras.entries() {
        if server_dir.join(extra).exists() && !entries.iter().any(|e| e == extra) {
            entries.push(extra.to_owned());
        }
    }
    BackupPlan {
        entries,
        full_copy: false,
    }
}

/// Entries of a snapshot folder that a fallback restore may overwrite.
pub fn snapshot_entries(snapshot: &Path, infrastructure: &[String]) -> Vec<String> {
    sorted_names(snapshot)
        .into_iter()
        .filter(|name| name != MANIFEST_FILE && !is_excluded(name, infrastructure))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn infra() -> Vec<String> {
        vec!["logs".into(), "backups".into(), "servers".into()]
    }

    fn mkworld(dir: &Path, name: &str) {
        fs::create_dir_all(dir.join(name).join("region")).unwrap();
    }

    #[test]
    fn level_name_and_companions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("server.properties"), "level-name=survival\n").unwrap();
        mkworld(dir.path(), "survival");
        mkworld(dir.path(), "survival_nether");
        mkworld(dir.path(), "world");
        fs::create_dir_all(dir.path().join("plugins")).unwrap();

        let extras = BackupExtras {
            backup_plugins: true,
            backup_mods: true,
            ..Default::default()
        };
        let plan = resolve(dir.path(), &extras, &infra());
        assert_eq!(
            plan,
            BackupPlan {
                entries: vec!["survival".into(), "survival_nether".into(), "plugins".into()],
                full_copy: false,
            }
        );
    }

    #[test]
    fn default_level_is_world() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("world")).unwrap();
        fs::create_dir_all(dir.path().join("world_the_end")).unwrap();
        let plan = resolve(dir.path(), &BackupExtras::default(), &infra());
        assert_eq!(plan.entries, vec!["world".to_owned(), "world_the_end".to_owned()]);
    }

    #[test]
    fn falls_back_to_first_region_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("server.properties"), "level-name=gone\n").unwrap();
        mkworld(dir.path(), "zeta");
        mkworld(dir.path(), "alpha");
        fs::create_dir_all(dir.path().join("aaa-not-a-world")).unwrap();
        let plan = resolve(dir.path(), &BackupExtras::default(), &infra());
        assert_eq!(plan.entries, vec!["alpha".to_owned()]);
        assert!(!plan.full_copy);
    }

    #[test]
    fn full_copy_skips_infrastructure_and_jars() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["logs", "backups", "data"] {
            fs::create_dir_all(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("server.jar"), b"").unwrap();
        fs::write(dir.path().join("eula.txt"), b"eula=true").unwrap();
        fs::write(dir.path().join(".hidden"), b"").unwrap();

        let plan = resolve(dir.path(), &BackupExtras::default(), &infra());
        assert!(plan.full_copy);
        assert_eq!(plan.entries, vec!["data".to_owned(), "eula.txt".to_owned()]);
    }

    #[test]
    fn world_dir_detection() {
        let dir = tempfile::tempdir().unwrap();
        mkworld(dir.path(), "world");
        fs::create_dir_all(dir.path().join("flat")).unwrap();
        fs::write(dir.path().join("flat").join("level.dat"), b"").unwrap();
        assert!(is_world_dir(&dir.path().join("world")));
        assert!(is_world_dir(&dir.path().join("flat")));
        assert!(!is_world_dir(dir.path()));
    }
}
