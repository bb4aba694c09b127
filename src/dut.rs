//! Object-safe boundary traits the kernel drives a device-under-test and
//! a waveform sink through.
//!
//! Concrete DUT bindings (a dual-port RAM model, an adder, ...) and
//! concrete waveform formats are out of scope; only the contract a
//! component needs to drive pins and record activity lives here.

/// A synchronous device model the kernel evaluates between phase edges.
///
/// `eval` is expected to be combinational-settle-to-fixed-point cheap;
/// the kernel calls it once per phase it drives, never concurrently with
/// itself.
pub trait Dut {
    /// Re-evaluate combinational logic against the current inputs.
    fn eval(&mut self);

    /// Drive a named input pin to `value`. Implementations decide how to
    /// map `name` to internal state; an unrecognized name is a contract
    /// violation left to the implementation to report (typically a
    /// panic, matching how out-of-bounds pin access behaves on real
    /// testbenches).
    fn set_input(&mut self, name: &str, value: u64);

    /// Read a named output pin's current value.
    fn get_output(&self, name: &str) -> u64;
}

/// A sink recording simulation activity for later inspection (VCD, FST,
/// or any other waveform format); the format itself is out of scope.
pub trait WaveformSink {
    /// Record the current signal values at `time_ps`.
    fn dump(&mut self, time_ps: u64);
}
