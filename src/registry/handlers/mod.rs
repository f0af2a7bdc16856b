pub mod connection;
pub mod project;
pub mod space;
