//! Process-wide tracing setup (stdout plus optional rolling file).

mod logger;

pub use logger::init_logger;
