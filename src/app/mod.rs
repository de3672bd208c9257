// NetGather - app/mod.rs
//
// Application layer: session providers, the concurrent executor, the
// background collection thread, run state, and post-run reporting.
// Dependencies: core, util.

pub mod collect;
pub mod executor;
pub mod report;
pub mod session;
pub mod ssh;
pub mod state;
