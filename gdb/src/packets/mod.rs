pub mod codec;
pub mod hex;
pub mod incoming;
pub mod psm;
pub mod response;
