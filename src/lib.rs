//! route-consolidator core
//!
//! Groups passenger trip requests into shared-vehicle routes: destination
//! clustering, time windowing, corridor splitting against a routing service
//! and duration reconciliation.

pub mod traits;
pub mod trip;
pub mod error;
pub mod config;
pub mod geodesy;
pub mod polyline;
pub mod clustering;
pub mod windowing;
pub mod base_group;
pub mod batch;
pub mod routing;
pub mod consolidation;
pub mod duration;
pub mod source;
pub mod pipeline;
