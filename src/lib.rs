//! Product experiment scheduler: plans A/B tests over calendar dates,
//! finds conflict-free slots, and consults a pluggable conflict oracle
//! before committing anything that overlaps existing experiments. State
//! is an event journal replayed at startup.

pub mod calendar;
pub mod engine;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod oracle;
pub mod registry;
pub mod sweeper;
