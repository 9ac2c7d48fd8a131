//! User-supplied input files: the audio recording and the raw lyrics text.

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Media type assumed when the file extension is unknown
pub const DEFAULT_AUDIO_MEDIA_TYPE: &str = "audio/mpeg";

/// An input file, either on disk or already held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFile {
    /// A file on disk, read lazily
    Path(PathBuf),
    /// Bytes already loaded, with the original file name
    Memory { name: String, bytes: Vec<u8> },
}

impl SourceFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// File name used in messages and for media type detection
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    /// Size in bytes, without reading the contents of on-disk files
    ///
    /// # Errors
    ///
    /// Returns an error if the file metadata cannot be read.
    pub async fn size(&self) -> Result<u64> {
        match self {
            Self::Path(path) => Ok(tokio::fs::metadata(path).await?.len()),
            Self::Memory { bytes, .. } => Ok(u64::try_from(bytes.len()).unwrap_or(u64::MAX)),
        }
    }

    /// Read the full contents
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?),
            Self::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }

    /// Read the contents as UTF-8 text
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid UTF-8.
    pub async fn read_text(&self) -> Result<String> {
        let bytes = self.read().await?;
        String::from_utf8(bytes).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.utf8_error()).into()
        })
    }

    /// Audio media type guessed from the file extension
    #[must_use]
    pub fn media_type(&self) -> &'static str {
        media_type_for_name(&self.name())
    }
}

/// Map an audio file name to its media type by extension
#[must_use]
pub fn media_type_for_name(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("m4a" | "aac") => "audio/aac",
        Some("ogg" | "oga" | "opus") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("webm") => "audio/webm",
        Some("mp4") => "audio/mp4",
        _ => DEFAULT_AUDIO_MEDIA_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_for_name() {
        assert_eq!(media_type_for_name("song.mp3"), "audio/mpeg");
        assert_eq!(media_type_for_name("Song.WAV"), "audio/wav");
        assert_eq!(media_type_for_name("take.m4a"), "audio/aac");
        assert_eq!(media_type_for_name("voice.opus"), "audio/ogg");
        assert_eq!(media_type_for_name("a.flac"), "audio/flac");
        assert_eq!(media_type_for_name("noext"), DEFAULT_AUDIO_MEDIA_TYPE);
        assert_eq!(media_type_for_name("weird.xyz"), DEFAULT_AUDIO_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_memory_source() {
        let source = SourceFile::from_bytes("lyrics.txt", b"hello\nworld".to_vec());
        assert_eq!(source.name(), "lyrics.txt");
        assert_eq!(source.size().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_path_source_size() {
        let path = std::env::temp_dir().join(format!("lyricsync-size-{}.txt", std::process::id()));
        tokio::fs::write(&path, b"twelve bytes").await.unwrap();
        let size = SourceFile::from_path(&path).size().await;
        let _ = tokio::fs::remove_file(&path).await;
        assert_eq!(size.unwrap(), 12);
    }

    #[test]
    fn test_path_source_name() {
        let source = SourceFile::from_path("/music/album/track.flac");
        assert_eq!(source.name(), "track.flac");
        assert_eq!(source.media_type(), "audio/flac");
    }

    #[tokio::test]
    async fn test_read_text_rejects_invalid_utf8() {
        let source = SourceFile::from_bytes("bad.txt", vec![0xff, 0xfe]);
        assert!(source.read_text().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_path_fails() {
        let source = SourceFile::from_path("/definitely/not/here.txt");
        assert!(source.size().await.is_err());
        assert!(source.read_text().await.is_err());
    }
}
