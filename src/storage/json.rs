//! Single-file JSON cluster repository
//!
//! Pretty-printed array of clusters, suitable for small deployments and for
//! inspecting a population by hand. Aliases live next to it in
//! `<file>.aliases.json`.

use super::traits::{ClusterRepository, StorageResult};
use crate::signal::{Cluster, ClusterAlias, ClusterId};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed [`ClusterRepository`]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn aliases_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".aliases.json");
        PathBuf::from(name)
    }

    fn load_aliases(&self) -> StorageResult<BTreeMap<ClusterId, ClusterAlias>> {
        let path = self.aliases_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let aliases: Vec<ClusterAlias> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Ok(aliases.into_iter().map(|a| (a.alias.clone(), a)).collect())
    }
}

/// Write via a sibling temp file so a crash never leaves a truncated store.
fn write_json_atomically<T: serde::Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl ClusterRepository for JsonFileStore {
    fn load(&self) -> StorageResult<Vec<Cluster>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let clusters: Vec<Cluster> = serde_json::from_reader(BufReader::new(File::open(&self.path)?))?;

        let mut seen = HashSet::with_capacity(clusters.len());
        let before = clusters.len();
        let unique: Vec<Cluster> = clusters
            .into_iter()
            .filter(|c| seen.insert(c.id().clone()))
            .collect();
        if unique.len() < before {
            warn!(
                path = %self.path.display(),
                dropped = before - unique.len(),
                "dropped duplicate cluster ids on load, keeping first occurrence"
            );
        }

        debug!(path = %self.path.display(), clusters = unique.len(), "loaded cluster population");
        Ok(unique)
    }

    fn save(&self, clusters: &[Cluster]) -> StorageResult<()> {
        write_json_atomically(&self.path, clusters)?;
        debug!(path = %self.path.display(), clusters = clusters.len(), "saved cluster population");
        Ok(())
    }

    fn record_aliases(&self, aliases: &[ClusterAlias]) -> StorageResult<()> {
        if aliases.is_empty() {
            return Ok(());
        }
        let mut stored = self.load_aliases()?;
        for alias in aliases {
            for existing in stored.values_mut() {
                if existing.survivor == alias.alias {
                    existing.survivor = alias.survivor.clone();
                }
            }
            stored.insert(alias.alias.clone(), alias.clone());
        }
        let list: Vec<&ClusterAlias> = stored.values().collect();
        write_json_atomically(&self.aliases_path(), &list)
    }

    fn resolve_alias(&self, id: &ClusterId) -> StorageResult<Option<ClusterId>> {
        Ok(self.load_aliases()?.remove(id).map(|a| a.survivor))
    }
}
