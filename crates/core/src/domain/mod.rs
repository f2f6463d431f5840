pub mod request;
pub mod role;
