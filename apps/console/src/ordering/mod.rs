//! Default block ordering for the consolidated PDF.
//!
//! Vendor blocks come back from the backend in workbook order. The export
//! screen presents them in a fixed business order instead, matching names
//! loosely so code prefixes, accents and spacing differences still line up.

pub mod canonical;
pub mod normalize;
pub mod reconcile;

pub use reconcile::apply_default_order;
