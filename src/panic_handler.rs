use std::panic;

use log::error;

/// Pretty backtraces on the terminal, plus the panic message in the log file
/// since worker threads usually panic far from anyone watching stderr.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let thread = std::thread::current();
        error!(
            "Thread '{}' panicked: {panic_info}",
            thread.name().unwrap_or("<unnamed>")
        );
        log::logger().flush();

        default_hook(panic_info);

        std::process::exit(1);
    }));
}
