pub mod container;

pub use container::{ContainerHandle, ContainerSpec, PortMapping, Protocol};
