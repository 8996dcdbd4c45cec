//! Server provisioning: consumes formed matches and allocates game servers

pub mod allocator;
pub mod listener;

pub use allocator::{Allocator, SimulatedAllocator};
pub use listener::ProvisioningListener;
