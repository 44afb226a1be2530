pub mod car;
pub mod health;
pub mod station;
