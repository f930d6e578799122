pub mod controller;
pub mod plan;
pub mod service;
