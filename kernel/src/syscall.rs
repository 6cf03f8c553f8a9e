//! System call dispatch.
//!
//! The software-interrupt stub hands the caller's saved frame to
//! [`dispatch`]; the opcode rides in `eax`, the first argument in `ebx`,
//! and results are written back into the caller's `ecx`. Fork and exit
//! re-enter the scheduler so the next task is picked in the same tick.
//!
//! `waitpid` (opcode 6) is raised on the timer vector rather than
//! `int 0x80` so the reschedule happens immediately, and the scheduler
//! records the wait itself. It is deliberately a no-op here.

use log::{debug, warn};

use crate::console::Console;
use crate::sched;
use crate::task::CpuState;

pub const SYS_GETPID: u32 = 1;
pub const SYS_FORK: u32 = 2;
pub const SYS_EXIT: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_GETCPID: u32 = 5;
pub const SYS_WAITPID: u32 = 6;

/// Sentinel written to the caller's `ecx` when fork cannot allocate a slot.
pub const FORK_FAILED: u32 = u32::MAX;

/// Handle one system call. Returns the frame to resume, which is the
/// caller's own frame unless the call rescheduled.
pub fn dispatch(mut ctx: CpuState, console: &mut dyn Console) -> CpuState {
    match ctx.eax {
        SYS_GETPID => {
            ctx.ecx = sched::current_pid();
            ctx
        }
        SYS_FORK => {
            // bind the result so the table lock is released before the
            // scheduler takes it again
            let forked = sched::table_lock().fork(&ctx);
            match forked {
                Ok(child_pid) => ctx.ecx = child_pid,
                Err(err) => {
                    warn!("fork failed: {}", err);
                    ctx.ecx = FORK_FAILED;
                }
            }
            // Reschedule so the child is eligible for dispatch right away.
            sched::schedule(ctx)
        }
        SYS_EXIT => {
            let exited = sched::table_lock().exit();
            match exited {
                Ok(()) => sched::schedule(ctx),
                Err(err) => {
                    warn!("exit failed: {}", err);
                    ctx
                }
            }
        }
        SYS_WRITE => {
            // ebx is an offset into the caller's own stack where a
            // NUL-terminated string lives.
            let offset = ctx.ebx as usize;
            let table = sched::table_lock();
            match table.current_task().and_then(|t| t.stack_cstr(offset)) {
                Some(bytes) => console.write_bytes(bytes),
                None => warn!("write: no string at stack offset {:#x}", offset),
            }
            ctx
        }
        SYS_GETCPID => {
            ctx.ecx = sched::current_child_pid();
            ctx
        }
        SYS_WAITPID => ctx,
        other => {
            debug!("unknown syscall {}", other);
            ctx
        }
    }
}
