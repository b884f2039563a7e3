pub mod claims;
pub mod cookie;
pub mod extractors;
pub mod jwt;
pub mod password;
