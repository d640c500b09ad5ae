//! The watch-debounce-rebuild core

pub mod debounce;
pub mod process;
pub mod supervisor;
