//! Reconstructs Dockerfile instructions from container image build history.
//!
//! Every image carries a history record per build step. `unbake` classifies
//! the free-form `created_by` text of each record and translates it into a
//! typed [`Directive`], then renders the sequence as Dockerfile text.
//!
//! The crate performs no I/O: loading images from archives lives in
//! `unbake-image`.
//!
//! # Quick start
//!
//! ```
//! use unbake::{HistoryEntry, ImageDescription};
//!
//! let image = ImageDescription::from_history(vec![
//!     HistoryEntry::new("/bin/sh -c #(nop)  WORKDIR /app", true),
//!     HistoryEntry::new("/bin/sh -c npm install", false),
//! ]);
//!
//! let text = unbake::to_dockerfile(&unbake::reconstruct(&image));
//! assert_eq!(text, "FROM <unknown>\nWORKDIR /app\nRUN npm install\n");
//! ```

mod args;
mod directive;
mod history;
mod image;
mod reconstruct;
mod render;

pub use directive::{BaseImage, Directive};
pub use history::{Keyword, Step, classify};
pub use image::{ContainerConfig, HistoryEntry, ImageDescription, LayerConfig, RootFs};
pub use reconstruct::{BASE_NAME_LABEL, reconstruct};
pub use render::{render, to_dockerfile};
