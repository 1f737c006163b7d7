pub mod health_handlers;
pub mod inspect_handlers;
pub mod session_handlers;
