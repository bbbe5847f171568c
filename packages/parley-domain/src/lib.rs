pub mod cursor;
pub mod meeting;
pub mod prefilter;
pub mod rfc3339;
pub mod suggestion;
pub mod thread;
