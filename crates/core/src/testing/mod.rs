//! Testing utilities and mock implementations.
//!
//! Mocks for every external seam so the crawl and conversion pipeline can be
//! exercised end to end without a feed, torrent client, transcoder or bot.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelcrawl_core::testing::{fixtures, MockFeed, MockTorrentClient};
//!
//! let feed = MockFeed::new();
//! feed.set_torrent(10, fixtures::single_file_torrent("a.mp4", 1024)).await;
//!
//! let client = MockTorrentClient::new();
//! // ... run a crawl cycle and dispatch ...
//! assert_eq!(client.submitted().await.len(), 1);
//! ```

mod mock_feed;
mod mock_notifier;
mod mock_torrent_client;
mod mock_transcoder;

pub use mock_feed::MockFeed;
pub use mock_notifier::{MockNotifier, SentNotice};
pub use mock_torrent_client::MockTorrentClient;
pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::repository::ItemMeta;

    const PIECE_LENGTH: u64 = 16384;

    fn bstr(out: &mut Vec<u8>, s: &[u8]) {
        out.extend_from_slice(s.len().to_string().as_bytes());
        out.push(b':');
        out.extend_from_slice(s);
    }

    fn bint(out: &mut Vec<u8>, n: u64) {
        out.push(b'i');
        out.extend_from_slice(n.to_string().as_bytes());
        out.push(b'e');
    }

    fn pieces(total: u64) -> Vec<u8> {
        let count = total.div_ceil(PIECE_LENGTH).max(1) as usize;
        vec![0xab; count * 20]
    }

    /// Wrap an encoded info dictionary into a complete .torrent file.
    fn torrent(info: Vec<u8>) -> Vec<u8> {
        let mut out = b"d".to_vec();
        bstr(&mut out, b"announce");
        bstr(&mut out, b"http://tracker.example.org/announce");
        bstr(&mut out, b"info");
        out.extend_from_slice(&info);
        out.push(b'e');
        out
    }

    /// A single-file .torrent with the given payload size.
    pub fn single_file_torrent(name: &str, length: u64) -> Vec<u8> {
        let mut info = b"d".to_vec();
        bstr(&mut info, b"length");
        bint(&mut info, length);
        bstr(&mut info, b"name");
        bstr(&mut info, name.as_bytes());
        bstr(&mut info, b"piece length");
        bint(&mut info, PIECE_LENGTH);
        bstr(&mut info, b"pieces");
        bstr(&mut info, &pieces(length));
        info.push(b'e');
        torrent(info)
    }

    /// A multi-file .torrent; `files` are `(relative path, size)` pairs.
    pub fn multi_file_torrent(name: &str, files: &[(&str, u64)]) -> Vec<u8> {
        let mut info = b"d".to_vec();
        bstr(&mut info, b"files");
        info.push(b'l');
        for (path, length) in files {
            info.push(b'd');
            bstr(&mut info, b"length");
            bint(&mut info, *length);
            bstr(&mut info, b"path");
            info.push(b'l');
            for part in path.split('/') {
                bstr(&mut info, part.as_bytes());
            }
            info.push(b'e');
            info.push(b'e');
        }
        info.push(b'e');
        bstr(&mut info, b"name");
        bstr(&mut info, name.as_bytes());
        bstr(&mut info, b"piece length");
        bint(&mut info, PIECE_LENGTH);
        bstr(&mut info, b"pieces");
        let total = files.iter().map(|(_, l)| l).sum();
        bstr(&mut info, &pieces(total));
        info.push(b'e');
        torrent(info)
    }

    /// Build item metadata from key/value pairs.
    pub fn meta(pairs: &[(&str, &str)]) -> ItemMeta {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
