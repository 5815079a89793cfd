mod handler;

pub use handler::{ClockResponse, current_time};
