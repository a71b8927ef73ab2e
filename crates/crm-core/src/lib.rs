pub mod common;
pub mod database;
pub mod domain;
pub mod kinetics;
pub mod numerics;
pub mod physics;
pub mod report;
