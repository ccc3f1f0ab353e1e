use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The on-disk record of indexed files, `indexed.json` inside the data
/// directory. The daemon replays it at startup so indexes survive restarts.
pub struct Manifest {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ManifestData {
    files: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    file: PathBuf,
}

impl Manifest {
    /// Open the manifest inside `data_dir`, creating the directory as
    /// needed. Returns the files to replay; with `clear` the directory is
    /// emptied first and the replay list comes back empty.
    pub fn open(data_dir: &Path, clear: bool) -> Result<(Manifest, Vec<PathBuf>)> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join("indexed.json");
        if clear {
            for entry in fs::read_dir(data_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    fs::remove_dir_all(entry.path())?;
                } else {
                    fs::remove_file(entry.path())?;
                }
            }
            return Ok((Manifest { path }, Vec::new()));
        }
        let replay = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<ManifestData>(&text) {
                Ok(data) => data.files.into_iter().map(|entry| entry.file).collect(),
                Err(err) => {
                    tracing::warn!("ignoring unreadable manifest {}: {}", path.display(), err);
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        Ok((Manifest { path }, replay))
    }

    pub fn add(&self, file: &Path) -> Result<()> {
        let mut data = self.load();
        if !data.files.iter().any(|entry| entry.file == file) {
            data.files.push(ManifestEntry {
                file: file.to_path_buf(),
            });
            self.save(&data)?;
        }
        Ok(())
    }

    pub fn remove(&self, file: &Path) -> Result<()> {
        let mut data = self.load();
        let before = data.files.len();
        data.files.retain(|entry| entry.file != file);
        if data.files.len() != before {
            self.save(&data)?;
        }
        Ok(())
    }

    fn load(&self) -> ManifestData {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn save(&self, data: &ManifestData) -> Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(data)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn add_remove_and_replay_round_trip() {
        let dir = TempDir::new().unwrap();
        let (manifest, replay) = Manifest::open(dir.path(), false).unwrap();
        assert!(replay.is_empty());

        manifest.add(Path::new("/tmp/a.js")).unwrap();
        manifest.add(Path::new("/tmp/b.js")).unwrap();
        manifest.add(Path::new("/tmp/a.js")).unwrap();

        let (manifest, replay) = Manifest::open(dir.path(), false).unwrap();
        assert_eq!(replay, vec![PathBuf::from("/tmp/a.js"), PathBuf::from("/tmp/b.js")]);

        manifest.remove(Path::new("/tmp/a.js")).unwrap();
        let (_, replay) = Manifest::open(dir.path(), false).unwrap();
        assert_eq!(replay, vec![PathBuf::from("/tmp/b.js")]);
    }

    #[test]
    fn clear_wipes_the_data_directory() {
        let dir = TempDir::new().unwrap();
        let (manifest, _) = Manifest::open(dir.path(), false).unwrap();
        manifest.add(Path::new("/tmp/a.js")).unwrap();
        fs::create_dir(dir.path().join("stale")).unwrap();

        let (_, replay) = Manifest::open(dir.path(), true).unwrap();
        assert!(replay.is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_manifest_replays_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("indexed.json"), "not json").unwrap();
        let (_, replay) = Manifest::open(dir.path(), false).unwrap();
        assert!(replay.is_empty());
    }
}
