use std::path::Path;

use serde::{Deserialize, Serialize};

pub trait FileIoWithBackup {
    /// Writes the given content to a file, keeping the previous version as `*.bak`.
    fn write_with_backup<P: AsRef<Path>>(path: P, content: &str) -> Result<(), std::io::Error> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        if path.exists() {
            let backup_path = path.with_extension("bak");
            std::fs::copy(path, backup_path)?;
        }

        std::fs::write(path, content)?;

        Ok(())
    }
}

/// JSON-backed configuration file.
pub trait Config: FileIoWithBackup {
    type ConfigType: Serialize + for<'de> Deserialize<'de>;

    fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Self::ConfigType> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self::ConfigType = serde_json::from_str(&content)?;
        Ok(config)
    }

    fn save_config<P: AsRef<Path>>(path: P, config: &Self::ConfigType) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(config)?;
        Self::write_with_backup(path, &content)?;
        Ok(())
    }

    /// Loads `path`, or writes `default()` there first when the file is missing.
    fn load_config_or_default<P: AsRef<Path>, F: FnOnce() -> Self::ConfigType>(
        path: P,
        default: F,
    ) -> anyhow::Result<Self::ConfigType> {
        match std::fs::metadata(path.as_ref()) {
            Ok(metadata) if metadata.is_file() => Self::load_config(path),
            _ => {
                let config = default();
                Self::save_config(path, &config)?;
                Ok(config)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    struct SampleFile;

    impl FileIoWithBackup for SampleFile {}

    impl Config for SampleFile {
        type ConfigType = Sample;
    }

    #[test]
    fn missing_file_is_created_with_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        let loaded = SampleFile::load_config_or_default(&path, || Sample {
            name: "fresh".into(),
            count: 1,
        })
        .unwrap();

        assert_eq!(loaded.name, "fresh");
        assert!(path.is_file());
    }

    #[test]
    fn save_keeps_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");

        SampleFile::save_config(&path, &Sample { name: "a".into(), count: 1 }).unwrap();
        SampleFile::save_config(&path, &Sample { name: "b".into(), count: 2 }).unwrap();

        let previous: Sample =
            serde_json::from_str(&std::fs::read_to_string(path.with_extension("bak")).unwrap())
                .unwrap();
        assert_eq!(previous, Sample { name: "a".into(), count: 1 });
        assert_eq!(SampleFile::load_config(&path).unwrap().count, 2);
    }
}
