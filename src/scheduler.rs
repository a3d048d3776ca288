use crate::command::VehicleCommand;
use crate::protocol::CommandRequest;
use chrono::{DateTime, Utc};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PENDING_COMMANDS: usize = 64;

pub type DueCommands = Vec<PendingCommand, MAX_PENDING_COMMANDS>;

/// A submitted command waiting for its completion time.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub request: CommandRequest,
    pub command: VehicleCommand,
    pub completion_time: DateTime<Utc>,
    pub will_fail: bool,
    pub submission_seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total_scheduled: u32,
    pub total_completed: u32,
    pub total_rejected: u32,
    pub currently_scheduled: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler queue full ({0} pending)")]
    QueueFull(usize),
}

#[derive(Debug)]
pub struct CommandScheduler {
    pending: Vec<PendingCommand, MAX_PENDING_COMMANDS>,
    next_submission_seq: u64,
    stats: SchedulerStats,
}

impl CommandScheduler {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            next_submission_seq: 0,
            stats: SchedulerStats::default(),
        }
    }

    /// Queue a command for completion at `completion_time`.
    ///
    /// Returns the submission sequence number used to break completion-time ties.
    pub fn schedule(
        &mut self,
        request: CommandRequest,
        command: VehicleCommand,
        completion_time: DateTime<Utc>,
        will_fail: bool,
    ) -> Result<u64, SchedulerError> {
        if self.pending.is_full() {
            self.stats.total_rejected += 1;
            return Err(SchedulerError::QueueFull(self.pending.len()));
        }

        let submission_seq = self.next_submission_seq;
        self.next_submission_seq += 1;

        let pending = PendingCommand {
            request,
            command,
            completion_time,
            will_fail,
            submission_seq,
        };

        if self.pending.push(pending).is_err() {
            self.stats.total_rejected += 1;
            return Err(SchedulerError::QueueFull(self.pending.len()));
        }

        // Stable ordering: completion time, then submission order
        self.pending
            .sort_by(|a, b| a.completion_time.cmp(&b.completion_time).then(a.submission_seq.cmp(&b.submission_seq)));

        self.stats.total_scheduled += 1;
        self.stats.currently_scheduled = self.pending.len() as u8;

        Ok(submission_seq)
    }

    /// Remove and return every command due at `now`, in completion order.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> DueCommands {
        let mut due = DueCommands::new();
        if self.pending.first().map_or(true, |first| first.completion_time > now) {
            return due;
        }

        let scheduled = core::mem::take(&mut self.pending);
        for command in scheduled {
            // Both buffers share one capacity, pushes cannot overflow
            if command.completion_time <= now {
                let _ = due.push(command);
            } else {
                let _ = self.pending.push(command);
            }
        }

        self.stats.total_completed += due.len() as u32;
        self.stats.currently_scheduled = self.pending.len() as u8;

        due
    }

    pub fn next_completion(&self) -> Option<DateTime<Utc>> {
        self.pending.first().map(|command| command.completion_time)
    }

    pub fn get_pending(&self) -> &[PendingCommand] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get_stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl Default for CommandScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CommandParams;
    use chrono::{Duration, TimeZone};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn request(name: &str) -> CommandRequest {
        CommandRequest {
            command: name.to_string(),
            params: CommandParams::new(),
            meta: None,
        }
    }

    fn schedule_at(scheduler: &mut CommandScheduler, name: &str, offset_ms: i64) -> u64 {
        scheduler
            .schedule(
                request(name),
                VehicleCommand::Unrecognized(name.to_string()),
                base_time() + Duration::milliseconds(offset_ms),
                false,
            )
            .unwrap()
    }

    #[test]
    fn test_scheduler_creation() {
        let scheduler = CommandScheduler::new();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.get_stats().total_scheduled, 0);
        assert!(scheduler.next_completion().is_none());
    }

    #[test]
    fn test_nothing_due_before_completion() {
        let mut scheduler = CommandScheduler::new();
        schedule_at(&mut scheduler, "a", 500);

        assert!(scheduler.take_due(base_time() + Duration::milliseconds(499)).is_empty());
        assert_eq!(scheduler.len(), 1);

        let due = scheduler.take_due(base_time() + Duration::milliseconds(500));
        assert_eq!(due.len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_due_commands_in_completion_order() {
        let mut scheduler = CommandScheduler::new();
        schedule_at(&mut scheduler, "late", 300);
        schedule_at(&mut scheduler, "early", 100);
        schedule_at(&mut scheduler, "middle", 200);
        schedule_at(&mut scheduler, "future", 5000);

        let due = scheduler.take_due(base_time() + Duration::milliseconds(1000));
        let names: std::vec::Vec<&str> = due.iter().map(|c| c.request.command.as_str()).collect();
        assert_eq!(names, ["early", "middle", "late"]);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.next_completion(), Some(base_time() + Duration::milliseconds(5000)));
    }

    #[test]
    fn test_ties_broken_by_submission_order() {
        let mut scheduler = CommandScheduler::new();
        let first = schedule_at(&mut scheduler, "first", 100);
        let second = schedule_at(&mut scheduler, "second", 100);
        let third = schedule_at(&mut scheduler, "third", 100);
        assert!(first < second && second < third);

        let due = scheduler.take_due(base_time() + Duration::milliseconds(100));
        let seqs: std::vec::Vec<u64> = due.iter().map(|c| c.submission_seq).collect();
        assert_eq!(seqs, [first, second, third]);
    }

    #[test]
    fn test_queue_full_rejected() {
        let mut scheduler = CommandScheduler::new();
        for i in 0..MAX_PENDING_COMMANDS {
            schedule_at(&mut scheduler, "fill", i as i64);
        }

        let result = scheduler.schedule(
            request("overflow"),
            VehicleCommand::Start,
            base_time(),
            false,
        );
        assert_eq!(result, Err(SchedulerError::QueueFull(MAX_PENDING_COMMANDS)));
        assert_eq!(scheduler.get_stats().total_rejected, 1);
        assert_eq!(scheduler.len(), MAX_PENDING_COMMANDS);
    }

    #[test]
    fn test_stats_track_completion() {
        let mut scheduler = CommandScheduler::new();
        schedule_at(&mut scheduler, "a", 0);
        schedule_at(&mut scheduler, "b", 10);
        scheduler.take_due(base_time() + Duration::milliseconds(10));

        let stats = scheduler.get_stats();
        assert_eq!(stats.total_scheduled, 2);
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.currently_scheduled, 0);
    }
}
