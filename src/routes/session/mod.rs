mod handler;
mod model;

pub use handler::{create_session, delete_session, get_session, refresh_session, update_session};
pub use model::{CreateSessionRequest, CreateSessionResponse, SessionDocument, UpdateSessionRequest};
