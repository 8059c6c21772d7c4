//! Torrent file parser.
//!
//! Uses librqbit-core to parse bencoded .torrent data and extract the
//! name, payload listing and info hash without downloading anything.

use librqbit_core::torrent_metainfo::{torrent_from_bytes, TorrentMetaV1Owned};

use super::{FeedError, ParsedItem};

/// Parse raw .torrent bytes read from `offset`.
///
/// Multi-file torrents list each payload as `/<name>/<path..>`, single-file
/// torrents as `/<name>`. A torrent without payload parses fine with a
/// total size of zero; callers decide what to do with it.
pub fn parse_feed_item(offset: u64, bytes: &[u8]) -> Result<ParsedItem, FeedError> {
    let torrent: TorrentMetaV1Owned =
        torrent_from_bytes(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;

    let info = &torrent.info;

    let name = info
        .name
        .as_ref()
        .map(|b| bytes_to_string(b.as_ref()))
        .filter(|n| !n.is_empty())
        .ok_or_else(|| FeedError::Parse("torrent has no name".to_string()))?;
    check_component(&name)?;

    let mut files = Vec::new();
    let mut total_size = 0u64;

    if let Some(ref entries) = info.files {
        for file in entries {
            let mut parts = vec![name.clone()];
            for part in &file.path {
                let part = bytes_to_string(part.as_ref());
                check_component(&part)?;
                parts.push(part);
            }
            files.push(format!("/{}", parts.join("/")));
            total_size = total_size.saturating_add(file.length);
        }
    } else {
        files.push(format!("/{}", name));
        total_size = info.length.unwrap_or(0);
    }

    Ok(ParsedItem {
        offset,
        name,
        total_size,
        files,
        info_hash: torrent.info_hash.as_string(),
        raw: bytes.to_vec(),
    })
}

/// Payload names end up joined onto the download directory, so each
/// component must be a single plain path segment.
fn check_component(part: &str) -> Result<(), FeedError> {
    if part.is_empty() || part == "." || part == ".." || part.contains(['/', '\\']) {
        return Err(FeedError::Parse(format!(
            "unsafe path component in torrent: {:?}",
            part
        )));
    }
    Ok(())
}

/// Whether a response body looks like a bencoded dictionary at all.
pub fn looks_bencoded(bytes: &[u8]) -> bool {
    bytes.first() == Some(&b'd')
}

/// Convert bytes to a string, replacing invalid UTF-8 sequences.
fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
