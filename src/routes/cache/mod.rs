mod handler;
mod model;

pub use handler::{INVALIDATION_CHANNEL, invalidate};
pub use model::{InvalidateQuery, InvalidateResponse};
