pub mod discovery;
pub mod register_validator;

pub use discovery::{fixed_endpoint, EndpointSource, PollJob};
pub use register_validator::{ProxyValidator, RegisterValidator, RegisterValidatorJob};
