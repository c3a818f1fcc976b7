//! Large text file viewer core.
//!
//! Pages through and searches line-oriented text files of any size without loading them
//! into memory. A background scanner builds a sparse positional index of every line while
//! the viewport can already be moved around; see [`file_viewer`] for the moving parts.
//!
//! The presentation layer (GUI or terminal) is not part of this crate. It implements
//! [`file_viewer::ViewerListener`] and drives a [`file_viewer::ViewerController`].

// Warn on redundant path prefixes (e.g., std::path::Path when Path is imported)
#![warn(unused_qualifications)]
// Use log::* macros instead of println!/eprintln! for proper log level control
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod file_viewer;
mod ignore_poison;

pub use config::{ViewerConfig, load_config};
pub use file_viewer::{
    MessageInfo, ScanProgress, Severity, ViewerContent, ViewerController, ViewerError, ViewerListener, ViewportState,
};
