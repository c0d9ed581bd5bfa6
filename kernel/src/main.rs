//! Limine boot entry for the Cinder kernel.
//!
//! The binary only makes sense on `x86_64-unknown-none`; hosted builds
//! get a stub `main` so `cargo test` can build the workspace and run the
//! library's unit tests.
#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod boot {
    use cinder_kernel::{arch, memory, shell, task};
    use cinder_log::println;
    use limine::BaseRevision;

    /// Base revision of the Limine protocol this kernel speaks.
    #[used]
    #[unsafe(link_section = ".limine_requests")]
    static BASE_REVISION: BaseRevision = BaseRevision::new();

    /// Kernel entry point, called by the Limine bootloader.
    #[unsafe(no_mangle)]
    unsafe extern "C" fn _start() -> ! {
        assert!(BASE_REVISION.is_supported());

        // Single core, interrupts masked: the core's concurrency model.
        arch::cpu::disable_interrupts();

        cinder_log::init();
        log::info!("[kernel] cinder booting");

        memory::init();
        task::process::init();
        task::sched::init();

        #[cfg(feature = "self_test")]
        cinder_kernel::selftest::run();

        banner();

        // The shell loop is the null process.
        shell::run()
    }

    fn banner() {
        println!();
        println!("========================================");
        println!("    cinder - minimal bare-metal kernel");
        println!("========================================");
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        log::error!("[kernel] panic: {}", info);
        arch::cpu::halt_loop()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    // Nothing to do on a hosted target.
}
