//! # whoami Common Library
//!
//! Shared code for the whoami listening-profile tool:
//! - Error type
//! - Configuration loading and tiered value resolution
//! - Audio-feature normalization and per-feature averaging

pub mod config;
pub mod error;
pub mod features;

pub use error::{Error, Result};
pub use features::{
    AverageTable, FeatureBounds, FeatureNormalizer, FeatureRange, FeatureTable, NormalizedRow,
    RawFeatureRecord,
};
