//! IO modules - side effects (network, filesystem, child processes)

pub mod archive;
pub mod download;
pub mod process;
