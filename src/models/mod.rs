pub mod contact;
pub mod emergency;
pub mod journey;
pub mod message;
pub mod wire;
pub mod zone;
