pub mod fixtures;

pub use fixtures::{listener_for, wait_until};
