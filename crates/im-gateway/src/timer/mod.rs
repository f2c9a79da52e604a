//! Timers shared by every connection

mod timing_wheel;

pub use timing_wheel::{TimerTask, TimingWheel};
