//! Utility functions and supporting infrastructure.
//!
//! Provides line-order bit serialization, the playback realism filter and the
//! error types shared by every stage of the pipeline.

pub mod bits;
pub mod errors;
pub mod noise;
