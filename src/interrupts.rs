/// Interrupt Descriptor Table (IDT) and interrupt handlers.
///
/// The IDT tells the CPU which function to call for each interrupt:
///   - 0-31: CPU exceptions (divide by zero, page fault, double fault, etc.)
///   - 32-47: Hardware interrupts (remapped from PIC: timer, keyboard, etc.)
///
/// The PIC 8259 manages hardware interrupts. We remap IRQs 0-7 from
/// IDT entries 8-15 to 32-47 to avoid colliding with CPU exceptions.
///
/// The timer handler is kept as the sole preemption trigger, but unlike
/// the teacher's version it no longer swaps a raw `InterruptFrame`
/// itself: it calls `task::scheduler::tick()` and, if a slice expired,
/// `task::scheduler::yield_now()`, which goes through the ordinary
/// `switch_context` path every other blocking call uses.

use crate::gdt;
use crate::hlt_loop;
use crate::intr;
use crate::serial_println;
use core::sync::atomic::{AtomicU64, Ordering};
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

pub static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

// 8254 PIT constants
const PIT_OSCILLATOR_HZ: u32 = 1_193_182;
const PIT_TARGET_HZ: u32 = 100; // 10ms timeslice
const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_CHANNEL0_PORT: u16 = 0x40;

/// Configure the 8254 PIT to fire at ~100 Hz (10ms timeslice).
pub fn init_pit() {
    use x86_64::instructions::port::Port;
    let divisor: u16 = (PIT_OSCILLATOR_HZ / PIT_TARGET_HZ) as u16;
    unsafe {
        Port::new(PIT_COMMAND_PORT).write(0x36u8);
        Port::new(PIT_CHANNEL0_PORT).write((divisor & 0xFF) as u8);
        Port::new(PIT_CHANNEL0_PORT).write((divisor >> 8) as u8);
    }
}

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
}

// --- IDT setup ---

static IDT: spin::Once<InterruptDescriptorTable> = spin::Once::new();

pub fn init_idt() {
    let idt = IDT.call_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        unsafe {
            idt.double_fault
                .set_handler_fn(double_fault_handler)
                .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
        }
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt[InterruptIndex::Timer as u8].set_handler_fn(timer_interrupt_handler);
        idt
    });
    idt.load();
}

// --- CPU Exception Handlers ---

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    serial_println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    _error_code: u64,
) -> ! {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    serial_println!("EXCEPTION: PAGE FAULT");
    serial_println!("Accessed Address: {:?}", Cr2::read());
    serial_println!("Error Code: {:?}", error_code);
    serial_println!("{:#?}", stack_frame);
    hlt_loop();
}

// --- Hardware Interrupt Handlers ---

/// Timer tick: bump the tick counters, send EOI, and — if the running
/// thread's slice expired — hand control to another ready thread.
///
/// The yield happens *after* `intr::leave_interrupt_context()`, mirroring
/// the classic trick this scheduler is built on: the interrupted thread's
/// own stack still holds this function's not-yet-executed `iretq`
/// epilogue underneath the call to `yield_now`, so suspending this thread
/// here and resuming it later finishes the interrupt correctly whenever
/// it's scheduled back in.
extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    intr::enter_interrupt_context();
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);

    let needs_yield = crate::task::scheduler::tick();

    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Timer as u8);
    }

    intr::leave_interrupt_context();

    if needs_yield {
        crate::task::scheduler::yield_now();
    }
}
