//! Structured notices and their text rendering.

use std::path::Path;

use serde::Serialize;

use crate::feed::escape_html;
use crate::repository::{FileStatus, ItemMeta};

/// Command that flips a file between Converting and Ready.
pub const SWITCH_COMMAND: &str = "/switchignore";

/// Command that forces a single feed offset to be re-checked.
pub const FORCE_COMMAND: &str = "/forceupload";

/// Something worth telling admins or subscribers about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    /// A payload file was handed to the transcoder.
    FileUploaded {
        file_id: i64,
        file_name: String,
        entry_id: String,
    },
    /// Uploading a payload file failed.
    FileFailed {
        file_id: i64,
        file_name: String,
        error: String,
    },
    /// A converted video is available.
    VideoReady {
        file_id: i64,
        item_name: String,
        ordinal: u32,
        meta: ItemMeta,
    },
    /// An operator switched a file's status.
    StatusSwitched {
        file_id: i64,
        file_name: String,
        status: FileStatus,
    },
    /// A forced offset check finished.
    ForcedCheck {
        offset: u64,
        item_name: Option<String>,
    },
    /// Crawl progress and files still in flight.
    State {
        version: String,
        offset: u64,
        pending: Vec<String>,
    },
    /// The requesting chat lacks permission.
    Unauthorized,
    /// A command failed.
    CommandFailed { error: String },
}

impl Notice {
    /// Render as Telegram-flavored HTML.
    pub fn render(&self) -> String {
        match self {
            Notice::FileUploaded {
                file_id,
                file_name,
                entry_id,
            } => format!(
                "Uploaded <b>{}</b> for conversion (entry {}).\n{} {}",
                escape_html(base_name(file_name)),
                escape_html(entry_id),
                SWITCH_COMMAND,
                file_id
            ),
            Notice::FileFailed {
                file_id,
                file_name,
                error,
            } => format!(
                "Failed to upload <b>{}</b> (file {}): {}",
                escape_html(base_name(file_name)),
                file_id,
                escape_html(error)
            ),
            Notice::VideoReady {
                item_name,
                ordinal,
                meta,
                ..
            } => render_video(item_name, *ordinal, meta),
            Notice::StatusSwitched {
                file_id,
                file_name,
                status,
            } => format!(
                "<b>{}</b> is now {}.\n{} {}",
                escape_html(base_name(file_name)),
                status,
                SWITCH_COMMAND,
                file_id
            ),
            Notice::ForcedCheck {
                offset,
                item_name: Some(name),
            } => format!("Offset {}: submitted <b>{}</b>.", offset, escape_html(name)),
            Notice::ForcedCheck {
                offset,
                item_name: None,
            } => format!("Offset {}: nothing to upload.", offset),
            Notice::State {
                version,
                offset,
                pending,
            } => {
                let mut text = format!("Version: {}\nOffset: {}\n", version, offset);
                if pending.is_empty() {
                    text.push_str("No pending files.");
                } else {
                    text.push_str("Pending files:\n");
                    for name in pending {
                        text.push_str(&escape_html(name));
                        text.push('\n');
                    }
                }
                text
            }
            Notice::Unauthorized => "Unauthorized.".to_string(),
            Notice::CommandFailed { error } => format!("Error: {}", escape_html(error)),
        }
    }
}

/// Metadata keys with a dedicated place in the video caption.
const TITLE_KEY: &str = "title";
const TAGS_KEY: &str = "tags";

fn render_video(item_name: &str, ordinal: u32, meta: &ItemMeta) -> String {
    // Metadata values arrive already escaped.
    let title = meta
        .get(TITLE_KEY)
        .cloned()
        .unwrap_or_else(|| escape_html(item_name));

    let mut text = format!("<b>{}</b> #{}", title, ordinal);
    for (key, value) in meta {
        if key != TITLE_KEY && key != TAGS_KEY {
            text.push_str(&format!("\n{}: {}", key, value));
        }
    }
    if let Some(tags) = meta.get(TAGS_KEY) {
        let tags = format_hashtags(tags);
        if !tags.is_empty() {
            text.push('\n');
            text.push_str(&tags);
        }
    }
    text
}

/// Turn "drama, crime ,  " into "#drama #crime".
pub fn format_hashtags(comma_separated: &str) -> String {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(|w| format!("#{}", w.replace(' ', "_")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn base_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
