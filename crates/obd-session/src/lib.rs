//! ELM327 Adapter Sessions
//!
//! Drives an adapter through a weighted command schedule on a dedicated
//! thread and streams decoded responses to async consumers.

mod driver;
mod pipe;
mod schedule;
mod session;

pub use driver::{AdapterDriver, DriverState};
pub use pipe::{pipe, unix_now, Chunk, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use schedule::{CommandSchedule, ScheduleConfig, ScheduleError};
pub use session::{AdapterSession, SessionConfig};
