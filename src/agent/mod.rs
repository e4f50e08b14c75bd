pub mod resolver;
pub mod viewer;
