//! Document source implementations.

pub mod screener;

pub use screener::ScreenerSource;
