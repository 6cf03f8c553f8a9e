//! Console output seam.
//!
//! The task core never touches video memory itself; the `write` syscall
//! forwards bytes to whatever [`Console`] the caller wired in. The VGA text
//! driver implements this on real hardware, hosted tests install a
//! buffer-backed implementor.

/// Byte sink for syscall text output.
pub trait Console {
    fn write_bytes(&mut self, bytes: &[u8]);

    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

/// Discards all output. Useful for callers that only care about scheduling
/// side effects.
pub struct NullConsole;

impl Console for NullConsole {
    fn write_bytes(&mut self, _bytes: &[u8]) {}
}
