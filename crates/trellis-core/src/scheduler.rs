//! Delayed task scheduler backed by a dedicated timer thread.
//!
//! The scheduler runs one-shot callbacks after a delay and supports
//! cancellation up to the moment a task fires. Tasks execute on the
//! scheduler's own thread, so callbacks must only touch state that is safe
//! to mutate off the owning thread (typically a dedicated mutex).
//!
//! # Example
//!
//! ```
//! use trellis_core::Scheduler;
//! use std::time::Duration;
//!
//! let scheduler = Scheduler::new();
//!
//! // Schedule a one-shot task to run after 5 milliseconds
//! let id = scheduler.schedule_once(Duration::from_millis(5), || {
//!     println!("Task executed!");
//! }).unwrap();
//!
//! // Cancel it before it fires
//! scheduler.cancel(id).ok();
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::error::{Result, SchedulerError};

new_key_type! {
    /// A unique identifier for a scheduled task.
    pub struct TaskId;
}

/// A boxed task closure.
type BoxedTask = Box<dyn FnOnce() + Send + 'static>;

/// Internal scheduled task data.
struct TaskData {
    /// When this task should execute.
    run_at: Instant,
    /// The task closure to execute.
    task: BoxedTask,
}

/// An entry in the scheduler queue (min-heap by execution time).
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    id: TaskId,
    run_at: Instant,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.run_at == other.run_at
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.run_at.cmp(&self.run_at)
    }
}

/// Shared scheduler state behind the mutex.
struct SchedulerState {
    /// All pending scheduled tasks.
    tasks: SlotMap<TaskId, TaskData>,
    /// Priority queue of pending executions (min-heap by run time).
    ///
    /// Entries whose ID is no longer in `tasks` were cancelled and are
    /// skipped lazily when they reach the front.
    queue: BinaryHeap<QueueEntry>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            tasks: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    /// Get the duration until the next task should execute, if any.
    fn time_until_next(&mut self) -> Option<Duration> {
        // Clean up any cancelled tasks from the front of the queue.
        while let Some(entry) = self.queue.peek() {
            if self.tasks.contains_key(entry.id) {
                break;
            }
            self.queue.pop();
        }

        self.queue.peek().map(|entry| {
            let now = Instant::now();
            if entry.run_at > now {
                entry.run_at - now
            } else {
                Duration::ZERO
            }
        })
    }

    /// Pop the next ready task, if any.
    fn pop_ready(&mut self) -> Option<(TaskId, BoxedTask)> {
        let now = Instant::now();
        while let Some(entry) = self.queue.peek() {
            if entry.run_at > now {
                return None;
            }
            let entry = self.queue.pop()?;
            // Cancelled tasks leave stale queue entries behind; skip them.
            if let Some(data) = self.tasks.remove(entry.id) {
                return Some((entry.id, data.task));
            }
        }
        None
    }
}

/// Commands sent to the timer thread.
enum PumpCommand {
    /// Re-evaluate the wait deadline (a task was scheduled or cancelled).
    Wake,
    /// Stop the timer thread.
    Shutdown,
}

/// Runs one-shot callbacks after a delay, with cancellation.
///
/// The scheduler owns a dedicated timer thread that sleeps until the next
/// deadline and executes ready tasks. Scheduling or cancelling from any
/// thread wakes the timer thread so the wait deadline stays accurate.
/// Dropping the scheduler shuts the thread down; tasks that have not fired
/// yet are discarded.
pub struct Scheduler {
    state: Arc<Mutex<SchedulerState>>,
    sender: Sender<PumpCommand>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a new scheduler and start its timer thread.
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(SchedulerState::new()));
        let (sender, receiver) = unbounded();

        let thread_state = state.clone();
        let handle = std::thread::spawn(move || {
            pump_loop(&thread_state, &receiver);
        });

        Self {
            state,
            sender,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Schedule a one-shot task to execute after the specified delay.
    ///
    /// The task runs on the scheduler's timer thread. Returns the task ID
    /// that can be used to cancel the task before it fires, or
    /// [`SchedulerError::ThreadStopped`] when the timer thread has shut
    /// down and the task can never run.
    pub fn schedule_once<F>(&self, delay: Duration, task: F) -> Result<TaskId>
    where
        F: FnOnce() + Send + 'static,
    {
        let run_at = Instant::now() + delay;
        let id = {
            let mut state = self.state.lock();
            let id = state.tasks.insert(TaskData {
                run_at,
                task: Box::new(task),
            });
            state.queue.push(QueueEntry { id, run_at });
            id
        };

        if self.sender.send(PumpCommand::Wake).is_err() {
            self.state.lock().tasks.remove(id);
            tracing::warn!(
                target: "trellis_core::scheduler",
                "task rejected: timer thread has stopped"
            );
            return Err(SchedulerError::ThreadStopped.into());
        }
        tracing::trace!(target: "trellis_core::scheduler", ?id, ?delay, "scheduled task");
        Ok(id)
    }

    /// Cancel a scheduled task.
    ///
    /// Returns `Ok(())` if the task was found and cancelled, or an error if
    /// it already fired, was already cancelled, or never existed.
    pub fn cancel(&self, id: TaskId) -> Result<()> {
        let removed = self.state.lock().tasks.remove(id).is_some();
        if removed {
            tracing::trace!(target: "trellis_core::scheduler", ?id, "cancelled task");
            let _ = self.sender.send(PumpCommand::Wake);
            Ok(())
        } else {
            Err(SchedulerError::InvalidTaskId.into())
        }
    }

    /// Check if a task is still pending.
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.state.lock().tasks.contains_key(id)
    }

    /// Get the number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    /// Stop the timer thread, discarding tasks that have not fired.
    ///
    /// Scheduling after shutdown fails with
    /// [`SchedulerError::ThreadStopped`]. Calling again is harmless; drop
    /// shuts down too.
    pub fn shutdown(&self) {
        let _ = self.sender.send(PumpCommand::Shutdown);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer thread body: sleep until the next deadline, run ready tasks.
fn pump_loop(state: &Mutex<SchedulerState>, receiver: &Receiver<PumpCommand>) {
    loop {
        let wait = state.lock().time_until_next();
        let command = match wait {
            Some(timeout) => receiver.recv_timeout(timeout),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(PumpCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(PumpCommand::Wake) | Err(RecvTimeoutError::Timeout) => {}
        }

        // Run every ready task, releasing the lock around each callback so
        // tasks can schedule or cancel without deadlocking.
        loop {
            let ready = state.lock().pop_ready();
            match ready {
                Some((id, task)) => {
                    tracing::trace!(target: "trellis_core::scheduler", ?id, "executing scheduled task");
                    task();
                }
                None => break,
            }
        }
    }
}
