pub mod bridge;
pub mod link;
pub mod transport;
pub mod types;
