//! Backend health and traffic statistics for a droplet load balancer.

pub mod config;
pub mod health;
pub mod load_balancer;
pub mod lifecycle;
pub mod observability;

pub use config::schema::BalancerConfig;
pub use lifecycle::Shutdown;
pub use load_balancer::backend::Backend;
pub use load_balancer::droplet::Droplet;
pub use load_balancer::inventory::{Inventory, InventoryError};
