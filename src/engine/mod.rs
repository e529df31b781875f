pub mod cache;
pub mod dispatch;
pub mod stage;
