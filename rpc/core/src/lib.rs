pub mod api;
pub mod model;

pub use api::NodeApi;
pub use model::*;
