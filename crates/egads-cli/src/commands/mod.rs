pub mod client;
pub mod daemon;
pub mod randtest;
pub mod sources;
