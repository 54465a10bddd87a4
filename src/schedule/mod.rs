//! Scheduled ("cron") triggers, one isolated registry per agent.

pub mod registry;

pub use registry::{
    FireCallback, JobInfo, ScheduleError, ScheduleKind, ScheduleRegistry, Scheduled,
    ScheduledFire,
};
