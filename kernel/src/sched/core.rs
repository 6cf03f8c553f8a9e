//! Timer-tick scheduling.
//!
//! [`TaskTable::schedule`] is the single entry point the timer interrupt
//! drives: it takes the interrupted frame, persists it into the current
//! task, picks the next runnable slot round-robin, and returns the frame to
//! resume. Waiter resolution happens during the scan: a task blocked in
//! `waitpid` wakes when its target has finished, and the scan prefers
//! running a still-live waitee so the waiter gets unblocked sooner.

use log::{debug, trace};

use super::table::TaskTable;
use crate::syscall::SYS_WAITPID;
use crate::task::{CpuState, TaskState, PID_NONE};

/// What the scan should do with a `Waiting` slot.
enum WaitVerdict {
    /// The wait target has finished (or a wildcard wait is satisfied):
    /// clear the wait and make the waiter runnable.
    Wake,
    /// The target is itself runnable: jump the scan cursor to it.
    RunTarget(usize),
    /// Nothing to do yet, scan past the waiter.
    Keep,
}

impl TaskTable {
    /// Pick the next frame to resume.
    ///
    /// `incoming` is the interrupted CPU state. When no task is runnable
    /// (or the table is empty) it is returned unchanged and the cursor
    /// does not move.
    pub fn schedule(&mut self, incoming: CpuState) -> CpuState {
        // waitpid is raised on the timer vector so the reschedule happens
        // in the same tick; record the wait before anything else.
        if incoming.eax == SYS_WAITPID && self.current_index().is_some() {
            let _ = self.waitpid(incoming.ebx);
        }

        if self.num_tasks() == 0 {
            return incoming;
        }

        if let Some(task) = self.current_task_mut() {
            task.set_context(&incoming);
            if task.state == TaskState::Running {
                task.state = TaskState::Ready;
            }
        }

        let num_tasks = self.num_tasks();
        let start = match self.current_index() {
            Some(cur) => (cur + 1) % num_tasks,
            None => 0,
        };

        // Bounded scan: one lap can wake waiters, a second lap re-examines
        // them; past that nothing will become runnable this tick.
        let limit = 2 * num_tasks;
        let mut idx = start;
        let mut visited = 0usize;
        let chosen = loop {
            if visited > limit {
                trace!("no runnable task, resuming interrupted frame");
                return incoming;
            }
            visited += 1;

            let state = match self.task(idx) {
                Some(task) => task.state(),
                None => {
                    idx = (idx + 1) % num_tasks;
                    continue;
                }
            };

            match state {
                TaskState::Ready | TaskState::Running => break idx,
                TaskState::Finished => {
                    idx = (idx + 1) % num_tasks;
                }
                TaskState::Waiting => match self.resolve_waiter(idx) {
                    WaitVerdict::Wake => {
                        if let Some(task) = self.task_mut(idx) {
                            debug!("task {} woke from wait", task.pid);
                            task.wait_pid = PID_NONE;
                            task.state = TaskState::Ready;
                        }
                        // re-examine the same slot, now runnable
                    }
                    WaitVerdict::RunTarget(target_idx) => {
                        idx = target_idx;
                    }
                    WaitVerdict::Keep => {
                        idx = (idx + 1) % num_tasks;
                    }
                },
            }
        };

        self.set_current(chosen);
        let frame = match self.task_mut(chosen) {
            Some(task) => {
                task.state = TaskState::Running;
                task.context()
            }
            None => return incoming,
        };
        self.dump();
        frame
    }

    /// Decide what to do with the waiter in slot `waiter` without mutating
    /// anything.
    fn resolve_waiter(&self, waiter: usize) -> WaitVerdict {
        let Some(task) = self.task(waiter) else {
            return WaitVerdict::Keep;
        };
        let target = task.wait_target();

        if target == PID_NONE {
            return self.resolve_wait_any(task.pid());
        }

        match self.index_of(target) {
            Some(target_idx) => match self.task(target_idx).map(|t| t.state()) {
                Some(TaskState::Finished) => WaitVerdict::Wake,
                Some(TaskState::Ready) | Some(TaskState::Running) => {
                    WaitVerdict::RunTarget(target_idx)
                }
                _ => WaitVerdict::Keep,
            },
            // The target never existed; nothing will ever finish it.
            None => WaitVerdict::Keep,
        }
    }

    /// Wildcard wait: satisfied by any finished child of `parent`. A
    /// parent with no children at all wakes immediately, otherwise it
    /// would block forever.
    fn resolve_wait_any(&self, parent: crate::task::Pid) -> WaitVerdict {
        let mut has_child = false;
        let mut runnable_child = None;

        for idx in 0..self.num_tasks() {
            let Some(task) = self.task(idx) else { continue };
            if task.parent_pid() != parent {
                continue;
            }
            has_child = true;
            match task.state() {
                TaskState::Finished => return WaitVerdict::Wake,
                TaskState::Ready | TaskState::Running => {
                    if runnable_child.is_none() {
                        runnable_child = Some(idx);
                    }
                }
                TaskState::Waiting => {}
            }
        }

        if !has_child {
            return WaitVerdict::Wake;
        }
        match runnable_child {
            Some(idx) => WaitVerdict::RunTarget(idx),
            None => WaitVerdict::Keep,
        }
    }
}
