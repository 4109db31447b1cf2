//! Test suite for the fusion training pipeline
//!
//! Unit tests live next to each module; this suite drives the trainer end to
//! end against small synthetic image datasets written to temporary
//! directories.

pub mod integration_tests;


pub use fixtures::{DatasetFixture, RecordingSink};
