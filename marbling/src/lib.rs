pub mod capabilities;
pub mod capture;
pub mod clock;
pub mod color;
mod data;
pub mod drawer;
pub mod events;
pub mod fluid;
mod marbling;
pub mod material;
pub mod pointer;
pub mod pool;
pub mod render;
pub mod rng;
pub mod settings;
pub mod splat;

pub use marbling::{query_has_flag, Environment, Marbling, Problem, TouchPoint};
