//! Directory listing entries

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use remsh_transport::{RemoteDirEntry, RemoteStat};
use serde::{Deserialize, Serialize};

/// One file or directory on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    pub last_modified: Option<DateTime<Utc>>,
    /// `ls -l` style mode string, e.g. `drwxr-xr-x`
    pub permissions_summary: String,
}

impl From<RemoteDirEntry> for RemoteFileEntry {
    fn from(entry: RemoteDirEntry) -> Self {
        let RemoteDirEntry { name, path, stat } = entry;
        Self {
            name,
            path,
            size: stat.size,
            is_directory: stat.is_dir,
            last_modified: modified_at(&stat),
            permissions_summary: permissions_summary(stat.permissions, stat.is_dir),
        }
    }
}

fn modified_at(stat: &RemoteStat) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(stat.modified?).ok()?;
    DateTime::from_timestamp(secs, 0)
}

/// Render unix mode bits as a ten character `ls -l` string
pub fn permissions_summary(mode: Option<u32>, is_dir: bool) -> String {
    let type_char = if is_dir { 'd' } else { '-' };
    let Some(mode) = mode else {
        return format!("{}?????????", type_char);
    };

    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    std::iter::once(type_char)
        .chain(
            FLAGS
                .iter()
                .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' }),
        )
        .collect()
}

/// Directories first, then by name
pub fn listing_order(a: &RemoteFileEntry, b: &RemoteFileEntry) -> Ordering {
    b.is_directory
        .cmp(&a.is_directory)
        .then_with(|| a.name.cmp(&b.name))
}
