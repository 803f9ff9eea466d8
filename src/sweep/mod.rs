//! The sweep pipeline: candidate tracking, usage resolution, lock matching,
//! deletion, and the scheduler that sequences them into passes.

pub mod candidates;
pub mod deletion;
pub mod locks;
pub mod scheduler;
pub mod usage;
