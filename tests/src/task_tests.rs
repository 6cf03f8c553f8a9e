//! Task core tests: table lifecycle, fork semantics, round-robin
//! scheduling, waiter resolution, and the syscall dispatcher.
//!
//! Every test here shares the kernel's global task table, so they run
//! serialized and reset the table up front. The test body plays the role
//! of the interrupt stubs: it feeds saved frames in and inspects what
//! comes back.

use kestrel_kernel::console::{Console, NullConsole};
use kestrel_kernel::sched;
use kestrel_kernel::syscall::{
    dispatch, FORK_FAILED, SYS_EXIT, SYS_FORK, SYS_GETCPID, SYS_GETPID, SYS_WAITPID, SYS_WRITE,
};
use kestrel_kernel::task::{CpuState, TaskState, MAX_TASKS, PID_NONE, TASK_STACK_SIZE};
use serial_test::serial;

struct BufferConsole {
    bytes: Vec<u8>,
}

impl BufferConsole {
    fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl Console for BufferConsole {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
    sched::reset();
}

/// One timer tick with an uninteresting interrupted frame.
fn tick() -> CpuState {
    sched::schedule(CpuState::zero())
}

/// Table invariants that must hold after any sequence of operations.
fn assert_table_invariants() {
    let table = sched::table_lock();
    assert!(table.num_tasks() <= MAX_TASKS);
    if let Some(cur) = table.current_index() {
        assert!(cur < table.num_tasks());
    }

    let mut pids = Vec::new();
    for idx in 0..table.num_tasks() {
        let task = table.task(idx).expect("populated slot");
        assert!(task.pid() > 0);
        assert!(!pids.contains(&task.pid()), "duplicate pid {}", task.pid());
        pids.push(task.pid());
        assert!(task.context_offset() + CpuState::SIZE <= TASK_STACK_SIZE);
    }
}

#[test]
#[serial]
fn add_task_assigns_unique_pids() {
    init();
    let a = sched::add_task(0x10).unwrap();
    let b = sched::add_task(0x20).unwrap();
    let c = sched::add_task(0x30).unwrap();
    assert!(a > 0 && b > 0 && c > 0);
    assert_ne!(a, b);
    assert_ne!(b, c);

    let table = sched::table_lock();
    assert_eq!(table.num_tasks(), 3);
    assert_eq!(table.current_index(), None);
    for idx in 0..3 {
        assert_eq!(table.task(idx).unwrap().state(), TaskState::Ready);
    }
    drop(table);
    assert_table_invariants();
}

#[test]
#[serial]
fn empty_table_returns_incoming_frame() {
    init();
    let mut incoming = CpuState::zero();
    incoming.eip = 0xdead;
    incoming.edx = 42;
    let out = sched::schedule(incoming);
    assert_eq!(out, incoming);
    assert_eq!(sched::table_lock().current_index(), None);
}

#[test]
#[serial]
fn first_tick_dispatches_slot_zero() {
    init();
    sched::add_task(0x40).unwrap();
    sched::add_task(0x50).unwrap();

    let frame = tick();
    let eip = frame.eip;
    assert_eq!(eip, 0x40);

    let table = sched::table_lock();
    assert_eq!(table.current_index(), Some(0));
    assert_eq!(table.task(0).unwrap().state(), TaskState::Running);
    // the returned frame is exactly the dispatched task's stored context
    assert_eq!(frame, table.task(0).unwrap().context());
}

#[test]
#[serial]
fn round_robin_cycles_in_slot_order() {
    init();
    sched::add_task(0x10).unwrap();
    sched::add_task(0x20).unwrap();
    sched::add_task(0x30).unwrap();

    let mut seen = Vec::new();
    let mut frame = CpuState::zero();
    for _ in 0..6 {
        frame = sched::schedule(frame);
        seen.push(frame.eip);
    }
    assert_eq!(seen, vec![0x10, 0x20, 0x30, 0x10, 0x20, 0x30]);
    assert_table_invariants();
}

#[test]
#[serial]
fn fork_duplicates_caller() {
    init();
    let parent_pid = sched::add_task(0x60).unwrap();
    sched::table_lock()
        .task_mut(0)
        .unwrap()
        .write_stack(128, b"marker\0");
    let mut frame = tick();

    // the caller's live registers at the moment of fork
    frame.eax = SYS_FORK;
    frame.edx = 7;
    frame.esi = 0x5151;
    let child_frame = dispatch(frame, &mut NullConsole);

    // round-robin moves straight to the child, which sees a zeroed return
    let eax = child_frame.eax;
    let ecx = child_frame.ecx;
    let edx = child_frame.edx;
    let eip = child_frame.eip;
    assert_eq!(eax, 0);
    assert_eq!(ecx, 0);
    assert_eq!(edx, 7);
    assert_eq!(eip, 0x60);

    let table = sched::table_lock();
    assert_eq!(table.num_tasks(), 2);
    let parent = table.task(0).unwrap();
    let child = table.task(1).unwrap();

    assert_eq!(child.parent_pid(), parent_pid);
    assert_eq!(parent.child_pid(), child.pid());
    assert_eq!(child.child_pid(), PID_NONE);
    assert_eq!(child.context_offset(), parent.context_offset());

    // parent resumes with the child pid in its result register
    let parent_ctx = parent.context();
    let parent_ecx = parent_ctx.ecx;
    assert_eq!(parent_ecx, child.pid());

    // stack bytes were copied verbatim
    assert_eq!(child.stack_cstr(128), Some(&b"marker"[..]));

    drop(table);
    assert_table_invariants();
}

#[test]
#[serial]
fn fork_on_full_table_reports_sentinel() {
    init();
    for i in 0..MAX_TASKS {
        sched::add_task(i as u32).unwrap();
    }
    assert!(sched::add_task(0xffff).is_err());

    let mut frame = tick();
    frame.eax = SYS_FORK;
    dispatch(frame, &mut NullConsole);

    let table = sched::table_lock();
    assert_eq!(table.num_tasks(), MAX_TASKS);
    // the failure sentinel was persisted into the caller's frame
    let ctx = table.task(0).unwrap().context();
    let ecx = ctx.ecx;
    assert_eq!(ecx, FORK_FAILED);
}

#[test]
#[serial]
fn getpid_and_getcpid_land_in_result_register() {
    init();
    let pid = sched::add_task(0x70).unwrap();
    let mut frame = tick();

    frame.eax = SYS_GETPID;
    let out = dispatch(frame, &mut NullConsole);
    let ecx = out.ecx;
    assert_eq!(ecx, pid);

    // no fork yet: child pid is the null pid
    frame.eax = SYS_GETCPID;
    let out = dispatch(frame, &mut NullConsole);
    let ecx = out.ecx;
    assert_eq!(ecx, PID_NONE);

    frame.eax = SYS_FORK;
    let child_frame = dispatch(frame, &mut NullConsole);
    // child asks for its own child: none
    let mut probe = child_frame;
    probe.eax = SYS_GETCPID;
    let out = dispatch(probe, &mut NullConsole);
    let ecx = out.ecx;
    assert_eq!(ecx, PID_NONE);
}

#[test]
#[serial]
fn waitpid_blocks_until_child_exits() {
    init();
    sched::add_task(0x80).unwrap();
    let mut frame = tick();

    frame.eax = SYS_FORK;
    let mut child_frame = dispatch(frame, &mut NullConsole);

    // child exits; the parent is the only runnable task left
    child_frame.eax = SYS_EXIT;
    let mut parent_frame = dispatch(child_frame, &mut NullConsole);
    let child_pid = parent_frame.ecx;
    assert!(child_pid > 0);

    // parent waits on the already-finished child: the wait is recorded
    // and resolved on the same tick
    parent_frame.eax = SYS_WAITPID;
    parent_frame.ebx = child_pid;
    let resumed = sched::schedule(parent_frame);
    assert_eq!(resumed, parent_frame);

    let table = sched::table_lock();
    let parent = table.task(0).unwrap();
    assert_eq!(parent.state(), TaskState::Running);
    assert_eq!(parent.wait_target(), PID_NONE);
    assert_eq!(table.task(1).unwrap().state(), TaskState::Finished);
}

#[test]
#[serial]
fn waiter_parks_while_child_still_runs() {
    init();
    sched::add_task(0x90).unwrap();
    let mut frame = tick();

    frame.eax = SYS_FORK;
    let mut child_frame = dispatch(frame, &mut NullConsole);
    let table = sched::table_lock();
    let child_pid = table.task(1).unwrap().pid();
    drop(table);

    // child is current; tick it back to the parent first
    child_frame.eax = 0;
    let mut parent_frame = sched::schedule(child_frame);

    // parent waits on the live child: scheduler parks it and prefers the
    // waitee
    parent_frame.eax = SYS_WAITPID;
    parent_frame.ebx = child_pid;
    let running = sched::schedule(parent_frame);
    let eax = running.eax;
    assert_eq!(eax, 0); // the child's frame

    let table = sched::table_lock();
    assert_eq!(table.task(0).unwrap().state(), TaskState::Waiting);
    assert_eq!(table.task(0).unwrap().wait_target(), child_pid);
    assert_eq!(table.current_index(), Some(1));
    drop(table);

    // child exits; the next pass wakes the parent
    let mut exiting = running;
    exiting.eax = SYS_EXIT;
    dispatch(exiting, &mut NullConsole);

    let table = sched::table_lock();
    assert_eq!(table.task(0).unwrap().state(), TaskState::Running);
    assert_eq!(table.task(0).unwrap().wait_target(), PID_NONE);
}

#[test]
#[serial]
fn wildcard_wait_with_no_children_wakes_immediately() {
    init();
    sched::add_task(0xa0).unwrap();
    let mut frame = tick();

    frame.eax = SYS_WAITPID;
    frame.ebx = PID_NONE;
    let resumed = sched::schedule(frame);
    assert_eq!(resumed, frame);

    let table = sched::table_lock();
    assert_eq!(table.task(0).unwrap().state(), TaskState::Running);
}

#[test]
#[serial]
fn exit_of_last_runnable_task_returns_incoming() {
    init();
    sched::add_task(0xb0).unwrap();
    let mut frame = tick();

    frame.eax = SYS_EXIT;
    let out = dispatch(frame, &mut NullConsole);
    assert_eq!(out, frame);

    let table = sched::table_lock();
    assert_eq!(table.task(0).unwrap().state(), TaskState::Finished);
}

#[test]
#[serial]
fn scenario_fork_three_children_then_wait_for_any() {
    init();
    sched::add_task(0xc0).unwrap();
    let mut frame = tick();

    // parent forks three children, each exiting as soon as it runs
    for _ in 0..3 {
        frame.eax = SYS_FORK;
        let mut child_frame = dispatch(frame, &mut NullConsole);
        let eax = child_frame.eax;
        assert_eq!(eax, 0);
        child_frame.eax = SYS_EXIT;
        frame = dispatch(child_frame, &mut NullConsole);
    }

    // back in the parent: wait for any child, then exit
    frame.eax = SYS_WAITPID;
    frame.ebx = PID_NONE;
    frame = sched::schedule(frame);
    frame.eax = SYS_EXIT;
    dispatch(frame, &mut NullConsole);

    let table = sched::table_lock();
    assert_eq!(table.num_tasks(), 4);
    for idx in 0..4 {
        assert_eq!(table.task(idx).unwrap().state(), TaskState::Finished);
    }
    drop(table);
    assert_table_invariants();
}

#[test]
#[serial]
fn scenario_console_ordering_across_fork_and_wait() {
    init();
    sched::add_task(0xd0).unwrap();

    // stage the strings the task "programs" print; fork copies them into
    // the child along with the rest of the stack
    {
        let mut table = sched::table_lock();
        let parent = table.task_mut(0).unwrap();
        assert!(parent.write_stack(0, b"child\n\0"));
        assert!(parent.write_stack(16, b"parent1\n\0"));
        assert!(parent.write_stack(32, b"parent2\n\0"));
    }

    let mut console = BufferConsole::new();
    let mut frame = tick();

    // parent: print "parent1\n"
    frame.eax = SYS_WRITE;
    frame.ebx = 16;
    frame = dispatch(frame, &mut console);

    // parent: fork; the child runs next
    frame.eax = SYS_FORK;
    let mut child_frame = dispatch(frame, &mut console);

    // child: print "child\n", then exit
    child_frame.eax = SYS_WRITE;
    child_frame.ebx = 0;
    child_frame = dispatch(child_frame, &mut console);
    child_frame.eax = SYS_EXIT;
    let mut parent_frame = dispatch(child_frame, &mut console);

    // parent: wait on the child it just forked, then print "parent2\n"
    let child_pid = parent_frame.ecx;
    parent_frame.eax = SYS_WAITPID;
    parent_frame.ebx = child_pid;
    let mut resumed = sched::schedule(parent_frame);
    resumed.eax = SYS_WRITE;
    resumed.ebx = 32;
    dispatch(resumed, &mut console);

    let text = console.text();
    let p1 = text.find("parent1").expect("parent1 printed");
    let p2 = text.find("parent2").expect("parent2 printed");
    let ch = text.find("child").expect("child printed");
    assert!(p1 < p2);
    assert!(p1 < ch);
}

#[test]
#[serial]
fn write_syscall_rejects_bad_offsets() {
    init();
    sched::add_task(0xe0).unwrap();
    let mut frame = tick();

    let mut console = BufferConsole::new();
    frame.eax = SYS_WRITE;
    frame.ebx = TASK_STACK_SIZE as u32 + 1;
    dispatch(frame, &mut console);
    assert!(console.text().is_empty());
}

#[test]
#[serial]
fn unknown_opcode_is_a_no_op() {
    init();
    sched::add_task(0xf0).unwrap();
    let frame = tick();

    let mut probe = frame;
    probe.eax = 99;
    let out = dispatch(probe, &mut NullConsole);
    assert_eq!(out, probe);

    let table = sched::table_lock();
    assert_eq!(table.current_index(), Some(0));
    assert_eq!(table.task(0).unwrap().state(), TaskState::Running);
}
