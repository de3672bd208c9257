// NetGather - core/mod.rs
//
// Core logic layer: data model, target lists, the line corpus, filters,
// the template engine and registry, structured extraction, and export.
// Must NOT depend on: app, platform.

pub mod corpus;
pub mod export;
pub mod extract;
pub mod filter;
pub mod model;
pub mod registry;
pub mod table;
pub mod targets;
pub mod template;
