//! Papercut mutations
//!
//! Sites are located on a concretized tree, bound to rewrites, and turned
//! either into one variant per branch or into a single mux-encoded design.

pub mod mux;
pub mod rewrite;
pub mod shrink;
pub mod site;
pub mod variant;

pub use mux::{MuxEncoder, MuxedDesign};
pub use rewrite::{Branch, ConflictPolicy, Conflict, Rewrite, RewriteKind, RewriteSet};
pub use site::{Category, Site, SiteLocator};
pub use variant::{Choice, DEFAULT_MAX_EXHAUSTIVE_SITES, Variant, VariantGenerator};
