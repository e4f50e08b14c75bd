pub mod classifier;
pub mod fetcher;
pub mod source_cache;
pub mod viewer_route;
