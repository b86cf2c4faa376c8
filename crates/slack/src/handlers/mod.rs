//! Built-in bot commands.

pub mod help;
pub mod hit;
pub mod link;
pub mod short;
pub mod translate;

pub use help::HelpHandler;
pub use hit::HitHandler;
pub use link::LinkHandler;
pub use short::ShortHandler;
pub use translate::TranslateHandler;
