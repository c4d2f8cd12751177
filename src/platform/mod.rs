//! OS process primitives.
//!
//! The supervised pipeline is a Linux deployment, so only the unix backend exists.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{
    descendants, find_descendant_by_name, interrupt_group, kill_process, process_alive,
    process_group_of,
};
