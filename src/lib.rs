// NetGather - lib.rs
//
// Library entry point. The `netgather` binary in `main.rs` is a thin
// command-line front-end over these modules; integration tests use them
// directly.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
