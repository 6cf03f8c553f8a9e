//! Task control blocks.
//!
//! A [`Task`] owns its 4 KiB kernel stack outright; the saved CPU frame
//! lives *inside* that stack at `ctx_offset`, which is how the interrupt
//! path finds it. Fork duplicates the stack bytes verbatim and keeps the
//! same offset in the child. Stack frames that hold absolute pointers into
//! the parent stack are undefined in the child; that is the same contract
//! user code gets from the real interrupt path.

mod context;

pub use context::{CpuState, INITIAL_EFLAGS, KERNEL_CODE_SELECTOR};

use core::fmt;

/// Process identifier. Monotonically assigned, never reused, always > 0.
pub type Pid = u32;

/// "No task": unassigned lineage fields, and the wildcard wait target.
pub const PID_NONE: Pid = 0;

/// Capacity of the task table. Slots are never reclaimed within a run.
pub const MAX_TASKS: usize = 256;

/// Size of each task's kernel stack in bytes.
pub const TASK_STACK_SIZE: usize = 4096;

/// Task lifecycle states.
///
/// `Finished` is terminal; a `Waiting` task returns to `Ready` only when
/// the scheduler observes its wait target finish.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    Waiting,
    Finished,
}

impl TaskState {
    pub const fn as_str(self) -> &'static str {
        match self {
            TaskState::Ready => "READY",
            TaskState::Running => "RUNNING",
            TaskState::Waiting => "WAITING",
            TaskState::Finished => "FINISHED",
        }
    }
}

/// Failures the task table can report. The syscall ABI has no error
/// channel beyond a sentinel register value, so the dispatcher flattens
/// these; tests and future in-kernel callers get the full story.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskError {
    TableFull,
    NoCurrentTask,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::TableFull => f.write_str("task table full"),
            TaskError::NoCurrentTask => f.write_str("no task is currently running"),
        }
    }
}

/// Task control block.
pub struct Task {
    pub(crate) pid: Pid,
    pub(crate) ppid: Pid,
    pub(crate) cpid: Pid,
    pub(crate) state: TaskState,
    /// PID this task is blocked on while `Waiting`; `PID_NONE` means
    /// "any child".
    pub(crate) wait_pid: Pid,
    /// Byte offset of the saved [`CpuState`] within `stack`. Invariant:
    /// `ctx_offset + CpuState::SIZE <= TASK_STACK_SIZE`.
    pub(crate) ctx_offset: usize,
    pub(crate) stack: [u8; TASK_STACK_SIZE],
}

impl Task {
    /// Build a fresh task whose first dispatch starts at `entry_ip`. The
    /// initial frame sits at the very top of the stack.
    pub(crate) fn new(pid: Pid, entry_ip: u32) -> Task {
        let mut task = Task {
            pid,
            ppid: PID_NONE,
            cpid: PID_NONE,
            state: TaskState::Ready,
            wait_pid: PID_NONE,
            ctx_offset: TASK_STACK_SIZE - CpuState::SIZE,
            stack: [0; TASK_STACK_SIZE],
        };

        let mut ctx = CpuState::zero();
        ctx.eip = entry_ip;
        ctx.cs = KERNEL_CODE_SELECTOR;
        ctx.eflags = INITIAL_EFLAGS;
        task.set_context(&ctx);
        task
    }

    /// Copy this task for fork: stack bytes verbatim, frame at the same
    /// offset. The caller wires up lineage and the child's registers.
    pub(crate) fn duplicate(&self, pid: Pid) -> Task {
        Task {
            pid,
            ppid: self.pid,
            cpid: PID_NONE,
            state: TaskState::Ready,
            wait_pid: PID_NONE,
            ctx_offset: self.ctx_offset,
            stack: self.stack,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn parent_pid(&self) -> Pid {
        self.ppid
    }

    pub fn child_pid(&self) -> Pid {
        self.cpid
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn wait_target(&self) -> Pid {
        self.wait_pid
    }

    pub fn context_offset(&self) -> usize {
        self.ctx_offset
    }

    /// The saved frame, read out of this task's stack.
    pub fn context(&self) -> CpuState {
        CpuState::load(&self.stack[self.ctx_offset..self.ctx_offset + CpuState::SIZE])
    }

    /// Persist a frame into this task's stack at its context offset.
    pub(crate) fn set_context(&mut self, ctx: &CpuState) {
        ctx.store(&mut self.stack[self.ctx_offset..self.ctx_offset + CpuState::SIZE]);
    }

    /// NUL-terminated byte string living on this task's stack, or `None`
    /// if the offset is out of range or no terminator follows it.
    pub fn stack_cstr(&self, offset: usize) -> Option<&[u8]> {
        let bytes = self.stack.get(offset..)?;
        let len = bytes.iter().position(|&b| b == 0)?;
        Some(&bytes[..len])
    }

    /// Stage bytes in this task's stack. This is the loader seam: whatever
    /// sets a task up (boot code, a test harness) places string constants
    /// and initial data here before the task first runs. Returns `false`
    /// without writing if the range does not fit.
    pub fn write_stack(&mut self, offset: usize, bytes: &[u8]) -> bool {
        match self.stack.get_mut(offset..offset + bytes.len()) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                true
            }
            None => false,
        }
    }
}
