pub mod events;
pub mod job;
pub mod report;
pub mod states;
