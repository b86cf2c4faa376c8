pub mod lock;
pub mod object;
pub mod short_url;
