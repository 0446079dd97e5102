pub mod fallback;
pub mod intersection;

pub use fallback::*;
pub use intersection::*;
