pub mod compose;
pub mod config;
pub mod db;
pub mod detect;
pub mod discord;
pub mod error;
pub mod health;
pub mod model;
pub mod normalize;
pub mod piazza;
pub mod pipeline;
pub mod route;
