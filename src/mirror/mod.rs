//! Peer mirrors rebuilt from the fact store independently of the graph.
//!
//! Each one performs its own destructive rebuild. They are not coordinated
//! with the graph synchronizer or with each other, so consistency across
//! mirrors is eventual.

pub mod document;
pub mod roster;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::MirrorResult;
use crate::store::FactStore;

pub use document::DocumentMirror;
pub use roster::{Roster, RosterMirror, StudentEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorReport {
    pub mirror: &'static str,
    pub documents: u64,
    /// Source rows that failed the mirror's validation
    pub rejected: u64,
}

pub trait PeerMirror {
    fn name(&self) -> &'static str;

    /// Drop the mirror's content and rebuild it from `facts`
    fn rebuild(&self, facts: &FactStore) -> MirrorResult<MirrorReport>;
}

/// Every peer mirror, writing under `dir`
pub fn peer_mirrors(dir: &Path) -> Vec<Box<dyn PeerMirror>> {
    vec![
        Box::new(DocumentMirror::new(dir)),
        Box::new(RosterMirror::new(dir)),
    ]
}

/// Write `path` through a sibling temp file that is renamed over it,
/// so readers see the old content or the new, never a mix.
pub(crate) fn replace_file<F>(path: &Path, write: F) -> MirrorResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> MirrorResult<()>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
