pub mod inspector;
pub mod webhook;
