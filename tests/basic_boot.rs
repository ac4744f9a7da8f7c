/// Integration test: verify the kernel boots and serial output works.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(kthreads::test_runner)]
#![reexport_test_harness_entry = "test_main"]

use bootloader_api::{entry_point, BootInfo};
use core::panic::PanicInfo;
use kthreads::serial_println;

entry_point!(main);

fn main(_boot_info: &'static mut BootInfo) -> ! {
    kthreads::init();
    test_main();
    kthreads::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kthreads::test_panic_handler(info)
}

#[test_case]
fn test_serial_println_simple() {
    serial_println!("test_serial_println_simple output");
}

#[test_case]
fn test_serial_println_many() {
    for i in 0..200 {
        serial_println!("test_serial_println_many output {}", i);
    }
}
