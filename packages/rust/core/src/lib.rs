//! End-to-end orchestration: acquisition followed by assembly, behind one
//! entry point the front end calls.

pub mod pipeline;

pub use pipeline::run;
