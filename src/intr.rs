/// Interrupt gate: the scheduler's only mutual-exclusion primitive.
///
/// Every ready-queue mutation, wait-list mutation, status transition,
/// donation update, and TID allocation happens with interrupts disabled.
/// This module wraps `x86_64`'s `cli`/`sti` pair with the nesting rules
/// the scheduler core depends on: a guard taken while interrupts are
/// already off must be a no-op restore, never a premature re-enable.

use core::sync::atomic::{AtomicBool, Ordering};
use x86_64::instructions::interrupts as cpu;

/// Current interrupt level, mirroring spec terminology (`ON`/`OFF`)
/// instead of a bare bool so call sites read like the spec's gate API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// Single-core kernel: a plain flag is enough to track "are we inside
/// an interrupt handler". Set on ISR entry, cleared on ISR exit.
static IN_INTERRUPT_CONTEXT: AtomicBool = AtomicBool::new(false);

pub fn disable() {
    cpu::disable();
}

pub fn enable() {
    cpu::enable();
}

pub fn level() -> IntrLevel {
    if cpu::are_enabled() {
        IntrLevel::On
    } else {
        IntrLevel::Off
    }
}

pub fn set_level(level: IntrLevel) {
    match level {
        IntrLevel::On => enable(),
        IntrLevel::Off => disable(),
    }
}

pub fn in_interrupt_context() -> bool {
    IN_INTERRUPT_CONTEXT.load(Ordering::Relaxed)
}

/// Marks entry into interrupt-handler context. Called once at the top
/// of the timer ISR, before any scheduler call.
pub(crate) fn enter_interrupt_context() {
    IN_INTERRUPT_CONTEXT.store(true, Ordering::Relaxed);
}

/// Marks exit from interrupt-handler context. Called once right before
/// the timer ISR returns (whether or not it switched threads).
pub(crate) fn leave_interrupt_context() {
    IN_INTERRUPT_CONTEXT.store(false, Ordering::Relaxed);
}

/// Scoped interrupt-disable guard with snapshot-and-restore semantics.
///
/// Nested guards compose correctly: the second `InterruptGuard::new()`
/// while interrupts are already off snapshots `Off` and restores `Off`,
/// rather than strictly stacking disable/enable calls. This is what lets
/// `thread_block` (which requires interrupts already off) and
/// `thread_yield` (which disables them itself) share code paths safely,
/// and what makes the nested disable inside `init_thread` a no-op.
pub struct InterruptGuard {
    prev: IntrLevel,
}

impl InterruptGuard {
    #[must_use]
    pub fn new() -> Self {
        let prev = level();
        disable();
        Self { prev }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        set_level(self.prev);
    }
}

/// Runs `f` with interrupts disabled, restoring the caller's prior level
/// on return (even if `f` panics past the guard via unwinding is not a
/// concern in this `panic = abort` kernel, but scoping still matters for
/// the non-panicking nested-call case).
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    let _guard = InterruptGuard::new();
    f()
}
