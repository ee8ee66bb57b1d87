//! Device description the planner is parameterized over.

pub mod platform;

pub use platform::PlatformInfo;
