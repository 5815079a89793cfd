mod handler;
mod model;

pub use handler::publish;
pub use model::PublishResponse;
