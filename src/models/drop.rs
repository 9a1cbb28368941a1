//! Represents an asset observed arriving at a source location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Whether the observed path was a plain file or a directory.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    File,
    Directory,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::File => "File",
            AssetKind::Directory => "Folder",
        }
    }
}

/// Reporting category derived from the file extension.
///
/// Directories are always `Folder`, whatever they contain.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetType {
    Video,
    Image,
    Audio,
    Document,
    Other,
    Folder,
}

impl AssetType {
    /// Map a file name onto its category using the fixed extension table.
    pub fn from_file_name(name: &str) -> Self {
        let ext = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => return AssetType::Other,
        };

        match ext.as_str() {
            "mp4" | "avi" | "mov" | "mkv" | "wmv" => AssetType::Video,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" => AssetType::Image,
            "mp3" | "wav" | "flac" | "aac" => AssetType::Audio,
            "txt" | "doc" | "docx" | "pdf" | "xml" => AssetType::Document,
            _ => AssetType::Other,
        }
    }

    pub fn for_asset(name: &str, kind: AssetKind) -> Self {
        match kind {
            AssetKind::Directory => AssetType::Folder,
            AssetKind::File => Self::from_file_name(name),
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetType::Video => "Video",
            AssetType::Image => "Image",
            AssetType::Audio => "Audio",
            AssetType::Document => "Document",
            AssetType::Other => "Other",
            AssetType::Folder => "Folder",
        };
        f.write_str(label)
    }
}

/// Identity of an asset: the source it was dropped into plus its name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub source: String,
    pub name: String,
}

impl AssetKey {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.name)
    }
}

/// One observed arrival at a source location.
///
/// Created once per distinct path observation and never mutated afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssetDrop {
    /// Configured source location id.
    pub source: String,

    /// Final path component of the observed path.
    pub name: String,

    /// Absolute path where the asset was observed.
    pub path: PathBuf,

    /// When the ingestion collaborator reported the arrival.
    pub observed_at: DateTime<Utc>,

    pub kind: AssetKind,

    pub asset_type: AssetType,

    /// Recursive count of contained files; zero for plain files.
    pub file_count: usize,

    /// Size in bytes at observation time; zero for directories.
    pub size_bytes: u64,
}

impl AssetDrop {
    pub fn key(&self) -> AssetKey {
        AssetKey::new(self.source.clone(), self.name.clone())
    }

    /// A directory that contained no files when it was observed.
    pub fn is_blank_folder(&self) -> bool {
        self.kind == AssetKind::Directory && self.file_count == 0
    }

    /// Count reported in drop notifications: contained files for folders, one otherwise.
    pub fn reported_count(&self) -> usize {
        match self.kind {
            AssetKind::Directory => self.file_count,
            AssetKind::File => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_table_is_case_insensitive() {
        assert_eq!(AssetType::from_file_name("clip.MOV"), AssetType::Video);
        assert_eq!(AssetType::from_file_name("poster.jpeg"), AssetType::Image);
        assert_eq!(AssetType::from_file_name("mix.Flac"), AssetType::Audio);
        assert_eq!(AssetType::from_file_name("notes.pdf"), AssetType::Document);
        assert_eq!(AssetType::from_file_name("archive.tar.gz"), AssetType::Other);
    }

    #[test]
    fn names_without_extension_are_other() {
        assert_eq!(AssetType::from_file_name("README"), AssetType::Other);
        assert_eq!(AssetType::from_file_name(".mp4"), AssetType::Other);
    }

    #[test]
    fn directories_are_folders_regardless_of_name() {
        assert_eq!(
            AssetType::for_asset("highlights.mp4", AssetKind::Directory),
            AssetType::Folder
        );
    }
}
