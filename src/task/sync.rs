//! Blocking synchronization primitives built directly on the scheduler
//! core: counting semaphores, a donating mutex `Lock`, and a condition
//! variable.
//!
//! None of the teacher's copied modules have an equivalent of these —
//! the teacher's executor parks async tasks on wakers instead of blocking
//! OS threads — so this module is grounded in spec.md's own description
//! of the classic Pintos `synch.c` trio, expressed with the `Semaphore`/
//! `Lock`/`CondVar` types and `spin::Mutex`-guarded fields the rest of
//! this crate already uses for shared state.

extern crate alloc;

use alloc::collections::VecDeque;

use spin::Mutex;

use crate::intr;

use super::scheduler;
use super::thread::{self, LockId, Tid};

/// Scans a waiter queue and removes the highest-effective-priority entry,
/// breaking ties by FIFO order (the first-found maximum, since the queue
/// preserves insertion order).
fn pop_highest_priority(waiters: &mut VecDeque<Tid>) -> Option<Tid> {
    let (index, _) = waiters
        .iter()
        .enumerate()
        .max_by_key(|(i, &tid)| (thread::effective_priority_of(tid), core::cmp::Reverse(*i)))?;
    waiters.remove(index)
}

pub struct Semaphore {
    value: Mutex<u32>,
    waiters: Mutex<VecDeque<Tid>>,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Self {
            value: Mutex::new(value),
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn down(&self) {
        loop {
            {
                let _guard = intr::InterruptGuard::new();
                let mut v = self.value.lock();
                if *v > 0 {
                    *v -= 1;
                    return;
                }
                drop(v);
                self.waiters.lock().push_back(scheduler::current_tid());
                scheduler::block();
            }
        }
    }

    pub fn try_down(&self) -> bool {
        let _guard = intr::InterruptGuard::new();
        let mut v = self.value.lock();
        if *v > 0 {
            *v -= 1;
            true
        } else {
            false
        }
    }

    /// Wakes the highest-priority waiter, if any, and increments the
    /// count. Yields immediately when the woken thread outranks the
    /// caller, so a higher-priority thread never waits for a full timer
    /// tick to actually run — sema_down/up pairs must behave like any
    /// other priority-respecting handoff, not just the lock/donation path.
    ///
    /// Yields unconditionally whenever called outside interrupt context,
    /// even if no waiter was actually woken — wasteful when `up` is
    /// called on an uncontended semaphore, but this is what the source
    /// this scheduler is modeled on does, and nothing downstream depends
    /// on `up` being a no-op for the caller's own time slice.
    pub fn up(&self) {
        {
            let _guard = intr::InterruptGuard::new();
            let woken = pop_highest_priority(&mut self.waiters.lock());
            *self.value.lock() += 1;
            if let Some(tid) = woken {
                scheduler::unblock(tid);
            }
        }

        if !intr::in_interrupt_context() {
            scheduler::yield_now();
        }
    }

    pub fn max_waiter_priority(&self) -> u8 {
        self.waiters
            .lock()
            .iter()
            .map(|&tid| thread::effective_priority_of(tid))
            .max()
            .unwrap_or(thread::PRI_MIN)
    }
}

/// Binary-semaphore-backed mutex with holder tracking and priority
/// donation across chained lock dependencies.
pub struct Lock {
    sema: Semaphore,
    holder: Mutex<Option<Tid>>,
}

impl Lock {
    pub const fn new() -> Self {
        Self {
            sema: Semaphore::new(1),
            holder: Mutex::new(None),
        }
    }

    pub fn held_by_current(&self) -> bool {
        *self.holder.lock() == Some(scheduler::current_tid())
    }

    fn id(&self) -> LockId {
        self as *const Lock as usize
    }

    pub fn try_acquire(&self) -> bool {
        if !self.sema.try_down() {
            return false;
        }
        let tid = scheduler::current_tid();
        *self.holder.lock() = Some(tid);
        thread::with_mut(tid, |t| t.owned_locks.push(self.id()));
        true
    }

    /// Acquires the lock, donating the caller's effective priority up the
    /// chain of lock holders when it would otherwise be forced to wait
    /// behind a lower-priority thread.
    pub fn acquire(&self) {
        let tid = scheduler::current_tid();
        assert!(
            !self.held_by_current(),
            "lock_acquire: already held by current thread"
        );

        {
            let _guard = intr::InterruptGuard::new();
            if let Some(holder) = *self.holder.lock() {
                thread::with_mut(tid, |t| t.blocked_on = Some(self.id()));
                propagate(holder, thread::effective_priority_of(tid));
            }
        }

        self.sema.down();

        let _guard = intr::InterruptGuard::new();
        thread::with_mut(tid, |t| t.blocked_on = None);
        *self.holder.lock() = Some(tid);
        thread::with_mut(tid, |t| t.owned_locks.push(self.id()));
    }

    pub fn release(&self) {
        assert!(
            self.held_by_current(),
            "lock_release: not held by current thread"
        );
        let tid = scheduler::current_tid();
        let lock_id = self.id();

        {
            let _guard = intr::InterruptGuard::new();
            *self.holder.lock() = None;

            // `recompute_donated_priority` walks the remaining owned locks'
            // waiter lists, which themselves call back into
            // `thread::effective_priority_of` (another `THREADS.lock()`).
            // `spin::Mutex` isn't reentrant, so that walk must happen
            // strictly outside the `with_mut` borrow below, not inside it.
            let remaining_locks = thread::with_mut(tid, |t| {
                t.owned_locks.retain(|&id| id != lock_id);
                t.owned_locks.clone()
            })
            .unwrap_or_default();
            let donated = recompute_donated_priority(&remaining_locks);
            thread::with_mut(tid, |t| t.donated_priority = donated);
        }

        self.sema.up();
    }
}

/// Recomputes a thread's donated priority from the locks it still holds,
/// after giving one up. Reads each remaining lock's waiter list through
/// its `LockId` — sound because a `LockId` is only ever the address of a
/// genuinely `'static` `Lock`. Takes the lock list by value rather than
/// through the owning `Thread`, so the caller can't accidentally run this
/// while still holding the thread table's lock.
fn recompute_donated_priority(owned_locks: &[LockId]) -> u8 {
    owned_locks
        .iter()
        .map(|&id| unsafe { &*(id as *const Lock) }.sema.max_waiter_priority())
        .max()
        .unwrap_or(0)
}

/// Walks the chain of lock holders starting at `holder`, raising each
/// one's donated priority to at least `priority` and following
/// `blocked_on` to the next link. Stops as soon as a link doesn't raise
/// the chain any further, which also naturally terminates on a (buggy,
/// caller-created) cyclic wait once every link has already absorbed the
/// donation.
fn propagate(holder: Tid, priority: u8) {
    let mut current = holder;
    loop {
        let raised = thread::with_mut(current, |t| {
            if priority > t.donated_priority {
                t.donated_priority = priority;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);

        if !raised {
            return;
        }

        scheduler::reposition(current);

        let next_lock = match thread::with(current, |t| t.blocked_on).flatten() {
            Some(id) => id,
            None => return,
        };
        let next_holder = *unsafe { &*(next_lock as *const Lock) }.holder.lock();
        match next_holder {
            Some(next) => current = next,
            None => return,
        }
    }
}

/// Raw pointer to a condvar waiter's stack-local wake-up semaphore. Sound
/// because `CondVar::wait` keeps that stack frame alive (blocked, not
/// unwound) for as long as the pointer sits in `waiters`.
struct WaiterSlot(*const Semaphore);

unsafe impl Send for WaiterSlot {}

pub struct CondVar {
    waiters: Mutex<VecDeque<(Tid, WaiterSlot)>>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Atomically releases `lock` and blocks on this condition variable,
    /// reacquiring `lock` before returning. `lock` must be held by the
    /// caller.
    pub fn wait(&self, lock: &Lock) {
        assert!(lock.held_by_current(), "cond_wait: lock not held by current thread");
        let waiter = Semaphore::new(0);
        let tid = scheduler::current_tid();
        self.waiters
            .lock()
            .push_back((tid, WaiterSlot(&waiter as *const Semaphore)));
        lock.release();
        waiter.down();
        lock.acquire();
    }

    /// Wakes the highest-priority waiter, if any. `lock` must be held by
    /// the caller.
    pub fn signal(&self, lock: &Lock) {
        assert!(lock.held_by_current(), "cond_signal: lock not held by current thread");
        let woken = {
            let mut waiters = self.waiters.lock();
            let index = waiters
                .iter()
                .enumerate()
                .max_by_key(|(i, (tid, _))| (thread::effective_priority_of(*tid), core::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            index.and_then(|i| waiters.remove(i))
        };
        if let Some((_, slot)) = woken {
            unsafe { (*slot.0).up() };
        }
    }

    /// Wakes every waiter currently queued. `lock` must be held by the
    /// caller.
    pub fn broadcast(&self, lock: &Lock) {
        assert!(lock.held_by_current(), "cond_broadcast: lock not held by current thread");
        while !self.waiters.lock().is_empty() {
            self.signal(lock);
        }
    }
}
