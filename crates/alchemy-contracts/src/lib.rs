pub mod catalog;
pub mod credentials;
pub mod generation;
pub mod providers;
