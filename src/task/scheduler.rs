//! Scheduler core: ready queue, preemption bookkeeping, and the thread
//! lifecycle operations built directly on `context::switch_context`.
//!
//! Grounded in the teacher's `task/scheduler.rs` for the overall shape
//! (a lock-protected run queue, a deferred stack-free slot,
//! `spawn_thread`/`exit_current_thread`/`sleep_ms`-style entry points)
//! with the switch mechanism itself replaced: the teacher swaps a raw
//! `InterruptFrame` captured by the timer ISR, which only works when
//! already inside that ISR. Here, `sema_down`/`lock_acquire`/`cond_wait`
//! must also be able to block a thread from a plain function call, so
//! `schedule()` always goes through the callee-saved `switch_context`
//! instead, whether it was reached from `thread_yield`, `thread_block`,
//! `thread_exit`, or the timer tick's forced preemption.

extern crate alloc;

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::config;
use crate::intr::{self, IntrLevel};
use crate::serial_println;

use super::context::{self, ThreadContext};
use super::sync::Semaphore;
use super::thread::{self, Tid, ThreadStatus, PRI_MAX};

pub const PRIORITY_LEVELS: usize = PRI_MAX as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// The kernel heap had no room for a new stack allocation.
    OutOfMemory,
}

type ThreadFn = extern "C" fn(u64);

static READY_QUEUE: Mutex<Option<[VecDeque<Tid>; PRIORITY_LEVELS]>> = Mutex::new(None);

fn with_ready_queue<R>(f: impl FnOnce(&mut [VecDeque<Tid>; PRIORITY_LEVELS]) -> R) -> R {
    let mut guard = READY_QUEUE.lock();
    let queues = guard.get_or_insert_with(|| core::array::from_fn(|_| VecDeque::new()));
    f(queues)
}

static CURRENT: AtomicU64 = AtomicU64::new(thread::TID_INVALID);
static IDLE_TID: AtomicU64 = AtomicU64::new(thread::TID_INVALID);
static SLICE_TICKS: AtomicU64 = AtomicU64::new(0);

static TICKS_IDLE: AtomicU64 = AtomicU64::new(0);
static TICKS_KERNEL: AtomicU64 = AtomicU64::new(0);
static TICKS_USER: AtomicU64 = AtomicU64::new(0);

/// Stack/context of whatever thread exited on the *previous* call to
/// `schedule`, freed at the top of this one — never on its own stack.
static PENDING_REAP: Mutex<Option<alloc::boxed::Box<thread::Thread>>> = Mutex::new(None);

pub fn current_tid() -> Tid {
    CURRENT.load(Ordering::Relaxed)
}

fn set_current_tid(tid: Tid) {
    CURRENT.store(tid, Ordering::Relaxed);
}

pub fn idle_tid() -> Tid {
    IDLE_TID.load(Ordering::Relaxed)
}

pub fn get_priority() -> u8 {
    thread::effective_priority_of(current_tid())
}

/// Registers the caller (the kernel's boot stack) as the first thread,
/// named "main". Must run with interrupts already disabled and before
/// `start`.
pub fn init() {
    debug_assert!(
        intr::level() == IntrLevel::Off,
        "scheduler::init requires interrupts off"
    );
    let tid = thread::register_bootstrap("main", thread::PRI_DEFAULT);
    set_current_tid(tid);
    serial_println!("[sched] thread table initialized, main tid={}", tid);
}

/// Creates the idle thread and turns on preemption. Blocks until idle has
/// run once, mirroring the teacher's `idle_started` handshake so the
/// caller never observes a window with no schedulable thread at all.
pub fn start() {
    static IDLE_STARTED: Semaphore = Semaphore::new(0);

    let idle = create(
        "idle",
        thread::PRI_MIN,
        idle_main,
        &IDLE_STARTED as *const Semaphore as u64,
    )
    .expect("scheduler::start: failed to create idle thread");
    IDLE_TID.store(idle, Ordering::Relaxed);

    intr::enable();
    IDLE_STARTED.down();
    serial_println!("[sched] preemption armed (idle tid={})", idle);
}

extern "C" fn idle_main(started: u64) {
    let sema = unsafe { &*(started as *const Semaphore) };
    sema.up();
    loop {
        intr::disable();
        block();
        unsafe {
            core::arch::asm!("sti", "hlt", options(nomem, nostack));
        }
    }
}

/// Called once per timer tick, with interrupts already disabled by the
/// ISR. Returns `true` when the running thread's slice has expired and
/// the caller (the ISR) should request a yield once it has finished its
/// own bookkeeping (EOI, etc.) — mirroring Pintos's `intr_yield_on_return`
/// rather than switching threads from inside the handler directly.
pub fn tick() -> bool {
    if current_tid() == idle_tid() {
        TICKS_IDLE.fetch_add(1, Ordering::Relaxed);
    } else {
        TICKS_KERNEL.fetch_add(1, Ordering::Relaxed);
    }
    let ticks = SLICE_TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    ticks >= config::TIME_SLICE as u64
}

pub fn tick_counts() -> (u64, u64, u64) {
    (
        TICKS_IDLE.load(Ordering::Relaxed),
        TICKS_KERNEL.load(Ordering::Relaxed),
        TICKS_USER.load(Ordering::Relaxed),
    )
}

/// Creates a new thread, registers and immediately unblocks it, then
/// yields so a higher-priority new thread preempts the caller right away
/// rather than waiting for the next tick.
pub fn create(name: &str, priority: u8, entry: ThreadFn, aux: u64) -> Result<Tid, SpawnError> {
    assert!(priority <= PRI_MAX, "scheduler::create: priority out of range");
    let tid = {
        let _guard = intr::InterruptGuard::new();
        let tid = thread::spawn(name, priority, entry as usize as u64, aux)?;
        unblock(tid);
        tid
    };
    yield_now();
    Ok(tid)
}

/// Moves a blocked thread onto the ready queue. Safe to call from
/// interrupt context (unlike `block`/`yield_now`): this is how a timer
/// callback or an ISR-driven wakeup would reschedule a sleeper.
pub fn unblock(tid: Tid) {
    let _guard = intr::InterruptGuard::new();
    thread::with_mut(tid, |t| {
        assert_eq!(
            t.status,
            ThreadStatus::Blocked,
            "scheduler::unblock: thread {} is not blocked",
            tid
        );
        t.status = ThreadStatus::Ready;
    });
    ready_push(tid);
}

/// Blocks the calling thread. Caller must have already recorded itself on
/// whatever wait list it's blocking for and disabled interrupts; not
/// callable from interrupt context.
pub fn block() {
    debug_assert!(!intr::in_interrupt_context(), "thread_block: in interrupt context");
    debug_assert!(
        intr::level() == IntrLevel::Off,
        "thread_block: interrupts must already be off"
    );
    let tid = current_tid();
    thread::with_mut(tid, |t| t.status = ThreadStatus::Blocked);
    schedule();
}

/// Voluntarily gives up the CPU. The caller stays `Ready` and is
/// re-enqueued at its own priority level, so a same-priority thread can
/// only run ahead of it, never starve it outright.
pub fn yield_now() {
    debug_assert!(!intr::in_interrupt_context(), "thread_yield: in interrupt context");
    let _guard = intr::InterruptGuard::new();
    let tid = current_tid();
    if tid != idle_tid() {
        thread::with_mut(tid, |t| t.status = ThreadStatus::Ready);
        ready_push(tid);
    }
    schedule();
}

/// Terminates the calling thread. Never returns.
pub fn exit() -> ! {
    debug_assert!(!intr::in_interrupt_context(), "thread_exit: in interrupt context");
    intr::disable();
    let tid = current_tid();
    thread::with_mut(tid, |t| t.status = ThreadStatus::Dying);
    schedule();
    unreachable!("scheduler::exit: dying thread {} was resumed", tid);
}

/// Sets the caller's base priority and yields, since this may make some
/// other ready thread strictly the highest priority.
pub fn set_priority(new_priority: u8) {
    assert!(new_priority <= PRI_MAX, "scheduler::set_priority: out of range");
    let tid = current_tid();
    thread::with_mut(tid, |t| t.base_priority = new_priority);
    yield_now();
}

/// Runs `f` against every live thread. Caller must already have
/// interrupts disabled.
pub fn foreach(mut f: impl FnMut(&thread::Thread)) {
    thread::for_each(|t| f(t));
}

fn ready_push(tid: Tid) {
    let priority = thread::effective_priority_of(tid) as usize;
    with_ready_queue(|queues| queues[priority].push_back(tid));
}

/// Moves a thread already sitting in the ready queue to the bucket for
/// its current effective priority. Called after a priority donation
/// changes a *ready* (not running, not blocked) thread's priority, since
/// the bucket it was pushed into may now be stale.
pub(super) fn reposition(tid: Tid) {
    let is_ready = thread::with(tid, |t| t.status == ThreadStatus::Ready).unwrap_or(false);
    if !is_ready {
        return;
    }
    let _guard = intr::InterruptGuard::new();
    with_ready_queue(|queues| {
        for bucket in queues.iter_mut() {
            if let Some(pos) = bucket.iter().position(|&t| t == tid) {
                bucket.remove(pos);
                break;
            }
        }
    });
    ready_push(tid);
}

/// Highest non-empty bucket wins; within a bucket, FIFO. Falls back to
/// the idle thread when nothing else is runnable.
fn next_to_run() -> Tid {
    with_ready_queue(|queues| {
        for bucket in queues.iter_mut().rev() {
            if let Some(tid) = bucket.pop_front() {
                return Some(tid);
            }
        }
        None
    })
    .unwrap_or_else(idle_tid)
}

/// Frees whatever thread a previous `schedule` call deferred.
fn reap_pending() {
    PENDING_REAP.lock().take();
}

/// The scheduler's single point of context switch. Caller must have
/// interrupts disabled and must already have transitioned its own status
/// away from `Running` (via `block`, `yield_now`'s re-enqueue, or `exit`).
fn schedule() {
    reap_pending();

    let current = current_tid();
    let next = next_to_run();

    if next != current {
        let dying = thread::with(current, |t| t.status == ThreadStatus::Dying).unwrap_or(false);

        let prev_ctx: *mut ThreadContext = if dying {
            let removed = thread::remove(current)
                .expect("scheduler::schedule: dying thread missing from table");
            let ctx_ptr = &removed.context as *const ThreadContext as *mut ThreadContext;
            *PENDING_REAP.lock() = Some(removed);
            ctx_ptr
        } else {
            thread::context_ptr(current).unwrap_or(core::ptr::null_mut())
        };

        let next_ctx: *const ThreadContext = thread::context_ptr(next)
            .expect("scheduler::schedule: next thread missing from table") as *const _;

        set_current_tid(next);
        unsafe {
            context::switch_context(prev_ctx, next_ctx);
        }
    }

    schedule_tail();
}

/// Runs immediately after a thread resumes from `switch_context` — either
/// because it was just scheduled in above, because `next == current` and
/// no switch happened at all, or (via `context::thread_entry_trampoline`)
/// because this is a freshly created thread's very first run, which never
/// passes back through `schedule()` at all.
pub(crate) fn schedule_tail() {
    let tid = current_tid();
    thread::with_mut(tid, |t| t.status = ThreadStatus::Running);
    SLICE_TICKS.store(0, Ordering::Relaxed);
}
