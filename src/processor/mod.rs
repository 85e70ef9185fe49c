pub mod message_processor;
pub mod session;
