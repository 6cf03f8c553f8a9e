//! The global task table.
//!
//! A bounded array of task slots plus two cursors: `num_tasks`, the
//! high-water mark of created tasks, and `current`, the slot whose context
//! is on the CPU. Slots are populated by `add_task` and `fork` and are
//! never reclaimed; a finished task keeps its slot for the rest of the run.

use log::{debug, trace};
use spin::Mutex;

use crate::task::{CpuState, Pid, Task, TaskError, TaskState, MAX_TASKS, PID_NONE};

/// Table storage. Interrupts are masked while the dispatcher runs, so the
/// lock is uncontended on hardware; it is what lets hosted tests share the
/// same global soundly.
pub static TASK_TABLE: Mutex<TaskTable> = Mutex::new(TaskTable::new());

const FREE_SLOT: Option<Task> = None;

pub struct TaskTable {
    slots: [Option<Task>; MAX_TASKS],
    /// High-water mark: slots `0..num_tasks` have been populated.
    num_tasks: usize,
    /// Slot index of the task on the CPU, `None` before the first dispatch.
    current: Option<usize>,
    next_pid: Pid,
}

impl TaskTable {
    pub const fn new() -> Self {
        Self {
            slots: [FREE_SLOT; MAX_TASKS],
            num_tasks: 0,
            current: None,
            next_pid: 1,
        }
    }

    fn alloc_pid(&mut self) -> Pid {
        let pid = self.next_pid;
        self.next_pid += 1;
        pid
    }

    /// Populate the next free slot with a task starting at `entry_ip`.
    pub fn add_task(&mut self, entry_ip: u32) -> Result<Pid, TaskError> {
        if self.num_tasks >= MAX_TASKS {
            return Err(TaskError::TableFull);
        }
        let pid = self.alloc_pid();
        let slot = self.num_tasks;
        self.slots[slot] = Some(Task::new(pid, entry_ip));
        self.num_tasks += 1;
        debug!("task {} added (slot {}, entry {:#x})", pid, slot, entry_ip);
        Ok(pid)
    }

    /// Duplicate the current task. `caller_ctx` is the caller's live frame
    /// as the syscall stub saved it; it is persisted into the parent stack
    /// first so the verbatim stack copy carries it into the child.
    ///
    /// The child's saved frame gets `eax = 0` and `ecx = 0`, which is how
    /// it recognizes itself on its first resumption. On `TableFull` no
    /// state is mutated.
    pub fn fork(&mut self, caller_ctx: &CpuState) -> Result<Pid, TaskError> {
        if self.num_tasks >= MAX_TASKS {
            return Err(TaskError::TableFull);
        }
        let cur = self.current.ok_or(TaskError::NoCurrentTask)?;
        let child_pid = self.alloc_pid();

        let child = {
            let parent = self.slots[cur].as_mut().ok_or(TaskError::NoCurrentTask)?;
            parent.set_context(caller_ctx);
            parent.cpid = child_pid;

            let mut child = parent.duplicate(child_pid);
            let mut ctx = child.context();
            ctx.eax = 0;
            ctx.ecx = 0;
            child.set_context(&ctx);
            child
        };

        let slot = self.num_tasks;
        self.slots[slot] = Some(child);
        self.num_tasks += 1;
        debug!(
            "task {} forked child {} (slot {})",
            self.slots[cur].as_ref().map(|t| t.pid).unwrap_or(PID_NONE),
            child_pid,
            slot
        );
        Ok(child_pid)
    }

    /// Mark the current task finished. Its slot stays occupied.
    pub fn exit(&mut self) -> Result<(), TaskError> {
        let cur = self.current.ok_or(TaskError::NoCurrentTask)?;
        let task = self.slots[cur].as_mut().ok_or(TaskError::NoCurrentTask)?;
        debug!("task {} exited", task.pid);
        task.state = TaskState::Finished;
        Ok(())
    }

    /// Block the current task on `target`. `PID_NONE` waits for any child.
    pub fn waitpid(&mut self, target: Pid) -> Result<(), TaskError> {
        let cur = self.current.ok_or(TaskError::NoCurrentTask)?;
        let task = self.slots[cur].as_mut().ok_or(TaskError::NoCurrentTask)?;
        trace!("task {} waiting on {}", task.pid, target);
        task.state = TaskState::Waiting;
        task.wait_pid = target;
        Ok(())
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub(crate) fn set_current(&mut self, idx: usize) {
        self.current = Some(idx);
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.current.and_then(|idx| self.slots[idx].as_ref())
    }

    pub(crate) fn current_task_mut(&mut self) -> Option<&mut Task> {
        let idx = self.current?;
        self.slots[idx].as_mut()
    }

    /// PID of the task on the CPU, `PID_NONE` if there is none.
    pub fn current_pid(&self) -> Pid {
        self.current_task().map(|t| t.pid).unwrap_or(PID_NONE)
    }

    /// PID of the current task's most recently forked child.
    pub fn current_child_pid(&self) -> Pid {
        self.current_task().map(|t| t.cpid).unwrap_or(PID_NONE)
    }

    /// Linear slot lookup by PID.
    pub fn index_of(&self, pid: Pid) -> Option<usize> {
        (0..self.num_tasks).find(|&idx| {
            self.slots[idx]
                .as_ref()
                .map(|t| t.pid == pid)
                .unwrap_or(false)
        })
    }

    pub fn num_tasks(&self) -> usize {
        self.num_tasks
    }

    pub fn task(&self, idx: usize) -> Option<&Task> {
        if idx >= self.num_tasks {
            return None;
        }
        self.slots[idx].as_ref()
    }

    pub fn task_mut(&mut self, idx: usize) -> Option<&mut Task> {
        if idx >= self.num_tasks {
            return None;
        }
        self.slots[idx].as_mut()
    }

    /// Log the process table, one line per populated slot.
    pub fn dump(&self) {
        trace!("  PID  PPID STATE");
        for idx in 0..self.num_tasks {
            if let Some(task) = self.slots[idx].as_ref() {
                trace!("{:>5} {:>5} {}", task.pid, task.ppid, task.state.as_str());
            }
        }
    }

    /// Drop every task and restart PID assignment. Boot-time and test
    /// bring-up hook; a live system never calls this.
    pub fn reset(&mut self) {
        if self.num_tasks > 0 {
            debug!("task table reset, dropping {} slots", self.num_tasks);
        }
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.num_tasks = 0;
        self.current = None;
        self.next_pid = 1;
    }
}
