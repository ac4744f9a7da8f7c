//! Thread table: the set of all live threads and per-thread state.
//!
//! Grounded in the teacher's `task/process.rs` `BTreeMap<Pid, Process>`
//! table, generalized with the fields a priority scheduler with
//! donation needs (`base_priority`/`donated_priority`/`owned_locks`/
//! `blocked_on`) and narrowed to the four statuses the scheduler core
//! actually distinguishes.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use spin::Mutex;

use super::context::ThreadContext;

pub type Tid = u64;

pub const TID_INVALID: Tid = 0;

/// Lowest/highest/default thread priority, per spec.md's `[0, 63]` range.
pub const PRI_MIN: u8 = 0;
pub const PRI_MAX: u8 = 63;
pub const PRI_DEFAULT: u8 = 31;

/// Thread names are capped like the C original's fixed `char[16]` buffer;
/// everything here is heap-backed already (the teacher's ambient stack is
/// `String`/`BTreeMap` throughout), so the cap is enforced by truncation
/// at creation instead of a hand-rolled fixed-size array.
pub const NAME_MAX: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Stable identity of a caller-owned `Lock`, used by `owned_locks`/
/// `blocked_on` instead of a borrow: locks are `'static` kernel objects
/// (declared as statics by the code that uses them), so their address is
/// a valid, stable handle for as long as the kernel runs. All lookups
/// through this handle happen with interrupts disabled, per the
/// scheduler's general "disable-interrupts-as-lock" discipline.
pub type LockId = usize;

/// Heap-allocated kernel stack owned by a single non-bootstrap thread.
///
/// Freed by `Drop` rather than a manual `dealloc_stack` call site: the
/// allocation is made with `alloc_zeroed` directly (not `Vec`/`Box<[u8]>`)
/// because the initial stack pointer must land on a 16-byte boundary,
/// which a plain byte-slice allocation doesn't promise.
struct ThreadStack {
    ptr: *mut u8,
    size: usize,
}

const STACK_ALIGN: usize = 16;

impl ThreadStack {
    fn alloc(size: usize) -> Option<Self> {
        let layout = alloc::alloc::Layout::from_size_align(size, STACK_ALIGN).ok()?;
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            None
        } else {
            Some(Self { ptr, size })
        }
    }

    /// Initial `rsp`: top of the allocation, already aligned since the
    /// allocation itself is `STACK_ALIGN`-aligned and `size` is a multiple
    /// of it for every caller in this module.
    fn top(&self) -> u64 {
        (self.ptr as usize + self.size) as u64
    }
}

impl Drop for ThreadStack {
    fn drop(&mut self) {
        let layout = alloc::alloc::Layout::from_size_align(self.size, STACK_ALIGN)
            .expect("ThreadStack: layout recorded at alloc time must still be valid");
        unsafe { alloc::alloc::dealloc(self.ptr, layout) };
    }
}

// Raw pointer, but only ever touched with the thread table lock held and
// never aliased: each `ThreadStack` is owned by exactly one `Thread`.
unsafe impl Send for ThreadStack {}

pub struct Thread {
    pub tid: Tid,
    pub name: String,
    pub status: ThreadStatus,
    pub base_priority: u8,
    pub donated_priority: u8,
    pub owned_locks: Vec<LockId>,
    pub blocked_on: Option<LockId>,
    pub wake_time: u64,
    pub(crate) context: ThreadContext,
    /// `None` for the bootstrap ("main") thread, which runs on the boot
    /// stack rather than a heap-allocated one.
    stack: Option<ThreadStack>,
}

impl Thread {
    pub fn effective_priority(&self) -> u8 {
        self.base_priority.max(self.donated_priority)
    }

    fn new(tid: Tid, name: &str, base_priority: u8, status: ThreadStatus) -> Self {
        let mut truncated = String::from(name);
        truncated.truncate(NAME_MAX);
        Self {
            tid,
            name: truncated,
            status,
            base_priority,
            donated_priority: 0,
            owned_locks: Vec::new(),
            blocked_on: None,
            wake_time: 0,
            context: ThreadContext::default(),
            stack: None,
        }
    }
}

static NEXT_TID: Mutex<Tid> = Mutex::new(1);

/// Allocates the next process-wide unique TID. Guarded by its own lock,
/// per spec.md §3/§5 — deliberately not a lock-free atomic, so the TID
/// counter's critical section reads the same as every other
/// interrupt-disabled critical section in this kernel.
pub fn alloc_tid() -> Tid {
    let mut next = NEXT_TID.lock();
    let tid = *next;
    *next += 1;
    tid
}

static THREADS: Mutex<BTreeMap<Tid, Box<Thread>>> = Mutex::new(BTreeMap::new());

/// Registers the bootstrap thread (the caller's own execution context at
/// `thread::init` time) with a fixed, well-known TID.
pub(super) fn register_bootstrap(name: &str, priority: u8) -> Tid {
    let tid = alloc_tid();
    let thread = Thread::new(tid, name, priority, ThreadStatus::Running);
    THREADS.lock().insert(tid, Box::new(thread));
    tid
}

/// Allocates a stack, lays out the initial context, and registers a new
/// thread in `Blocked` status (the caller is expected to `unblock` it
/// immediately — see `scheduler::create`).
pub(super) fn spawn(
    name: &str,
    priority: u8,
    entry: u64,
    aux: u64,
) -> Result<Tid, super::scheduler::SpawnError> {
    const STACK_SIZE: usize = 16 * 1024;
    let stack =
        ThreadStack::alloc(STACK_SIZE).ok_or(super::scheduler::SpawnError::OutOfMemory)?;

    let mut context = ThreadContext::default();
    context.rip = super::context::trampoline_addr();
    context.rsp = stack.top();
    context.r12 = entry;
    context.r13 = aux;

    let tid = alloc_tid();
    let mut thread = Thread::new(tid, name, priority, ThreadStatus::Blocked);
    thread.stack = Some(stack);
    thread.context = context;
    THREADS.lock().insert(tid, Box::new(thread));
    Ok(tid)
}

/// Removes and returns a thread's table entry. The returned box keeps the
/// thread's stack and context alive until the caller drops it — used by
/// `scheduler::schedule` to defer freeing a dying thread's stack until
/// the next scheduling point, never while still running on it.
pub(super) fn remove(tid: Tid) -> Option<Box<Thread>> {
    THREADS.lock().remove(&tid)
}

/// Raw pointer to a live thread's saved context, valid as long as the
/// entry stays in the table (or, for a just-removed dying thread, as long
/// as the caller keeps its `Box<Thread>` alive). Used only by
/// `scheduler::schedule` to drive `context::switch_context`.
pub(super) fn context_ptr(tid: Tid) -> Option<*mut ThreadContext> {
    THREADS
        .lock()
        .get_mut(&tid)
        .map(|t| &mut t.context as *mut ThreadContext)
}

pub fn with<R>(tid: Tid, f: impl FnOnce(&Thread) -> R) -> Option<R> {
    THREADS.lock().get(&tid).map(|t| f(t))
}

pub fn with_mut<R>(tid: Tid, f: impl FnOnce(&mut Thread) -> R) -> Option<R> {
    THREADS.lock().get_mut(&tid).map(|t| f(t))
}

/// Applies `f` to every live thread. Caller must already have interrupts
/// disabled, per spec.md §4.1's `thread_foreach` contract.
pub fn for_each(mut f: impl FnMut(&Thread)) {
    debug_assert!(
        !x86_64::instructions::interrupts::are_enabled(),
        "thread::for_each requires interrupts to already be off"
    );
    for thread in THREADS.lock().values() {
        f(thread);
    }
}

pub fn name_of(tid: Tid) -> String {
    with(tid, |t| t.name.clone()).unwrap_or_default()
}

pub fn effective_priority_of(tid: Tid) -> u8 {
    with(tid, Thread::effective_priority).unwrap_or(PRI_MIN)
}
