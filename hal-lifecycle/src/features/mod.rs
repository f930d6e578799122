pub mod lifecycle;
pub mod pending_state;
pub mod polling;
pub mod topology;
