//! # UI Module
//!
//! This module contains all UI components for the chromatic tuner.

pub mod cent_meter;
pub mod main_display;
