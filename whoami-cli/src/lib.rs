//! whoami-cli library interface
//!
//! Exposes the Spotify client, profile builder and renderers for the binary
//! and for integration testing.

pub mod profile;
pub mod render;
pub mod spotify_client;

pub use crate::profile::{Comparison, ProfileBuilder, ProfileError, TrackSource};
pub use crate::render::{ChartRenderer, JsonExport, StripChart};
pub use crate::spotify_client::{SpotifyClient, SpotifyError};
