pub mod disk_store;
pub mod explorer;
pub mod html_injector;
pub mod object_store;
#[cfg(feature = "s3")]
pub mod s3_store;
