pub mod alignment;
pub mod config;
pub mod error;
pub mod lrc;
pub mod paths;
pub mod playback;
pub mod resolver;
pub mod source;
pub mod store;
pub mod sync;
pub mod time;

pub use alignment::{
    lines_from_alignment, manual_lines, parse_alignment_json, AlignedLine, AlignmentRequest,
    LyricsAligner, DEFAULT_REVIEW_THRESHOLD,
};
pub use config::{
    AlignmentConfig, ExportConfig, GeminiConfig, LoggingConfig, LyricSyncConfig,
    GEMINI_API_KEY_ENV,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use lrc::{LrcDocument, LrcMetadata, DEFAULT_ATTRIBUTION, LRC_EXTENSION};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use playback::PlaybackState;
pub use resolver::{active_line_index, active_line_index_at};
pub use source::{media_type_for_name, SourceFile};
pub use store::{LineId, LinePatch, LineStore, LyricLine, INSERT_GAP};
pub use sync::{SessionPhase, SessionSettings, SyncController, SyncEvent, DEFAULT_MAX_AUDIO_BYTES};
pub use time::{
    duration_from_secs, format_timestamp, parse_timestamp, parse_timestamp_lossy, DurationExt,
};
