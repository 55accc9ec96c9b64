//! Debug console: the only logging channel this subsystem has, used for
//! human-facing diagnostics like `procdump`.
//!
//! `print!`/`println!` wrap a lock-guarded `core::fmt::Write` sink, the
//! same shape a concrete UART driver would back in a real kernel. That UART
//! driver is hardware this subsystem doesn't own, so the sink here is a
//! collaborator trait instead; everything else (the lock, the macro shape)
//! is unchanged.

use crate::sync::Spinlock;
use core::fmt::Write;

/// Anything that can receive console output. The real kernel points this
/// at a UART; tests point it at an in-memory buffer.
pub trait ConsoleSink: Write + Send {}
impl<T: Write + Send> ConsoleSink for T {}

pub static CONSOLE: Spinlock<Option<&'static mut dyn ConsoleSink>> = Spinlock::new(None);

/// Print out formatted text to the console, spinning to acquire the lock.
/// No-ops silently until [`set_sink`] installs a real collaborator.
macro_rules! print {
    ($($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut guard = $crate::console::CONSOLE.lock();
        if let Some(sink) = guard.as_mut() {
            let _ = core::write!(*sink, $($arg)*);
        }
    }};
}
pub(crate) use print;

macro_rules! println {
    ($($arg:tt)*) => {{
        $crate::console::print!($($arg)*);
        $crate::console::print!("\n");
    }};
}
pub(crate) use println;

/// Install the console's backing sink. Must be called once during kernel
/// init, before any `println!`.
///
/// # Safety
/// `sink` must outlive every future call to `print!`/`println!`.
pub unsafe fn set_sink(sink: &'static mut dyn ConsoleSink) {
    *CONSOLE.lock() = Some(sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink(std::string::String);
    impl core::fmt::Write for RecordingSink {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            self.0.push_str(s);
            Ok(())
        }
    }

    #[test]
    fn println_appends_newline() {
        static mut SINK: Option<RecordingSink> = None;
        unsafe {
            SINK = Some(RecordingSink(std::string::String::new()));
            #[allow(static_mut_refs)]
            set_sink(SINK.as_mut().unwrap());
        }
        println!("hello {}", 42);
        unsafe {
            #[allow(static_mut_refs)]
            assert_eq!(SINK.as_ref().unwrap().0, "hello 42\n");
        }
    }
}
