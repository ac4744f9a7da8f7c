#![no_std]
#![no_main]
#![feature(abi_x86_interrupt)]

extern crate alloc;

use bootloader_api::{entry_point, BootInfo, BootloaderConfig};
use core::panic::PanicInfo;

#[allow(deprecated)]
pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    config.mappings.physical_memory = Some(bootloader_api::config::Mapping::Dynamic);
    config.kernel_stack_size = 512 * 1024; // 512 KiB (default 80 KiB is too small)
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

/// Write a byte directly to the serial port (COM1 at 0x3F8).
/// No initialization needed for basic QEMU serial — just write.
fn serial_byte(b: u8) {
    unsafe {
        x86_64::instructions::port::Port::new(0x3F8).write(b);
    }
}

fn serial_str(s: &str) {
    for b in s.bytes() {
        serial_byte(b);
    }
}

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    // Absolute first thing: write directly to serial port
    serial_str("KERNEL ENTRY\n");

    kthreads::serial::init();
    kthreads::serial_println!("Serial initialized");

    // Init GDT, IDT, PICs
    kthreads::init();
    kthreads::serial_println!("GDT, IDT, PICs initialized");

    // Set up paging and heap
    let phys_mem_offset = x86_64::VirtAddr::new(
        boot_info
            .physical_memory_offset
            .into_option()
            .expect("physical_memory_offset not available"),
    );

    let mut mapper = unsafe { kthreads::memory::init(phys_mem_offset) };
    let mut frame_allocator =
        unsafe { kthreads::memory::BootInfoFrameAllocator::init(&boot_info.memory_regions) };

    kthreads::allocator::init_heap(&mut mapper, &mut frame_allocator)
        .expect("heap initialization failed");
    kthreads::serial_println!("Heap initialized");

    kthreads::interrupts::init_pit();
    kthreads::serial_println!("PIT configured at 100 Hz");

    // No `-o mlfqs` equivalent is parsed at boot yet, so this is always
    // the default (MLFQS off); installed before `scheduler::init` so
    // `config::mlfqs_enabled` is never read before it's set.
    kthreads::config::install(kthreads::config::SchedulerConfig::default());

    // Register the boot stack as the first thread, still with interrupts
    // off, before anything can preempt it.
    kthreads::task::scheduler::init();

    // Creates the idle thread and turns on preemption.
    kthreads::task::scheduler::start();
    kthreads::serial_println!("Scheduler armed, running self-tests");

    kthreads::demo::run_all();

    kthreads::hlt_loop()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kthreads::serial_println!("{}", info);
    kthreads::hlt_loop()
}
