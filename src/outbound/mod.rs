//! Outbound side: staged files per routing number, merged and uploaded at
//! each cutoff.

pub mod aggregator;
pub mod merge;
pub mod schedule;
pub mod staging;

pub use aggregator::{
    Aggregator, CutoffReport, CutoffRequest, CutoffTrigger, RoutingState, RoutingStates,
};
pub use merge::merge_files;
pub use schedule::{CutoffSchedule, RoutingCutoffs};
pub use staging::Staging;
