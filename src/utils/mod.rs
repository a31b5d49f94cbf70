//! Utility helpers

pub mod reboot;
