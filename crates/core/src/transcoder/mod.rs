//! Transcoding service abstraction.
//!
//! Uploaded files become remote entries; once the service has converted an
//! entry it exposes one or more variants and a download URL.

mod kaltura;
mod types;

pub use kaltura::KalturaClient;
pub use types::*;
