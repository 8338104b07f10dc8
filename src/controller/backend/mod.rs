pub mod adda_hardware;
pub mod mock;

#[cfg(feature = "sim")]
pub mod sim;
