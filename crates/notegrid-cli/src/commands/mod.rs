pub mod check;
pub mod common;
pub mod completions;
pub mod databases;
pub mod reorder;
pub mod show;
pub mod sync;
pub mod watch;
