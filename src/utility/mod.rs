pub mod opener;
pub mod timing;

pub use opener::open_in_viewer;
pub use timing::Timer;
