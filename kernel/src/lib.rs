//! Kestrel task core.
//!
//! This crate is the scheduling heart of the kernel: task control blocks,
//! the bounded task table, the round-robin scheduler, and the system-call
//! dispatcher. Everything hardware-facing (interrupt stubs, the VGA text
//! console, the timer) lives outside and reaches the core through narrow
//! seams: interrupt stubs hand in a saved [`task::CpuState`] and resume
//! whatever state comes back, console output goes through
//! [`console::Console`].
//!
//! ## Module Organization
//!
//! - `task`: task control block, saved CPU frame, lifecycle states
//! - `sched`: the task table and the timer-tick scheduler
//! - `syscall`: the `int 0x80` dispatcher
//! - `console`: the text-output collaborator seam

#![no_std]

pub mod console;
pub mod sched;
pub mod syscall;
pub mod task;
