//! Feed access.
//!
//! The feed is a numbered sequence of torrent slots. `FeedClient` resolves a
//! slot to a parsed torrent, `MetaSource` scrapes descriptive metadata for it.

mod http;
mod meta;
mod parser;
mod types;

pub use http::HttpFeedClient;
pub(crate) use meta::escape_html;
pub use meta::{HttpMetaSource, MetaExtractor};
pub use parser::parse_feed_item;
pub use types::*;
