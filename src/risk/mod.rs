//! Risk rules for held positions.
//!
//! Closes positions whose funding turned against them or whose price nears
//! liquidation or take-profit, and sizes the rest against the funding trend.

mod lifecycle;

pub use lifecycle::{Advice, PositionAdvisor, PositionLevels};
