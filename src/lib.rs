//! Labroster - selection and versioning engine for lab VM assignment configs
//!
//! An operator uploads one or two XML inventory files (a group config
//! listing students, access codes and assigned virtual systems, and
//! optionally a thumbnail settings file with per-system monitoring
//! notes), prunes which systems stay assigned per access code, and gets
//! back a canonically rewritten XML file. Every upload and every
//! generated output lands in an append-only JSON ledger with its raw
//! bytes zip-bundled next to it.
//!
//! ## Pipeline
//!
//! 1. [`parse`] normalizes either dialect into an ordered
//!    access-code → systems map and extracts access codes for indexing.
//! 2. [`selection`] computes the default retained set (optionally
//!    narrowed by an IP allow-list) and applies submitted selections.
//! 3. [`rewrite`] prunes unselected `<system>` elements from the original
//!    tree, reapplies the fixed ordering rules and stages the output.
//! 4. [`archive`] / [`versions`] record the transaction in their ledgers
//!    and bundle the bytes.
//!
//! ## Storage Layout
//!
//! ```text
//! data/
//! ├── uploads/                       # Current documents being edited
//! │   ├── group_config.xml
//! │   └── thumbnail_settings.xml
//! ├── archives/                      # Uploaded source bundles
//! │   ├── archive_metadata.json      # Archive ledger
//! │   └── 20260827_101500_config_files.zip
//! └── new_configs/                   # Generated config bundles
//!     ├── new_configs_metadata.json  # Version ledger
//!     ├── staging/                   # Rewriter output awaiting publish
//!     └── 20260827_101630_new_config_files.zip
//! ```
//!
//! ## Ordering rules
//!
//! Group documents are stable-sorted by the last two characters of each
//! access code on every parse and rewrite; groups sort by numeric
//! `group_id`. Thumbnail documents are never reordered. The asymmetry is
//! intentional and preserved.

pub mod archive;
pub mod config;
pub mod dom;
pub mod error;
pub mod ledger;
pub mod model;
pub mod parse;
pub mod rewrite;
pub mod selection;
pub mod versions;

pub use error::RosterError;
