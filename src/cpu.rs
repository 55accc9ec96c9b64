//! Per-CPU state: the currently running process slot, the switch-frame
//! used to re-enter the scheduler, and the nested push/pop interrupt-off
//! counter -- a cursor into the table, the currently running PCB index, an
//! `intena` save slot, and an `ncli` nested push-cli counter.
//!
//! Actually disabling/enabling hardware interrupts is a collaborator
//! (trap/interrupt entry, owned by the rest of the kernel); this module
//! only keeps the nesting discipline and calls through [`InterruptControl`].

use crate::param::NCPU;
use crate::proc::context::Context;

/// Toggle real interrupts on the calling hart. Implemented by the trap/
/// interrupt-entry collaborator outside this crate; a test double is
/// provided under `#[cfg(test)]` so the nesting discipline itself is
/// exercisable without real hardware.
pub trait InterruptControl {
    fn intr_get() -> bool;
    fn intr_on();
    fn intr_off();
}

#[cfg(not(test))]
extern "Rust" {
    fn __intr_get() -> bool;
    fn __intr_on();
    fn __intr_off();
}

#[cfg(not(test))]
pub struct Hal;
#[cfg(not(test))]
impl InterruptControl for Hal {
    fn intr_get() -> bool {
        unsafe { __intr_get() }
    }
    fn intr_on() {
        unsafe { __intr_on() }
    }
    fn intr_off() {
        unsafe { __intr_off() }
    }
}

#[cfg(test)]
pub struct Hal;
#[cfg(test)]
impl InterruptControl for Hal {
    fn intr_get() -> bool {
        TEST_INTR_ENABLED.with(|c| c.get())
    }
    fn intr_on() {
        TEST_INTR_ENABLED.with(|c| c.set(true))
    }
    fn intr_off() {
        TEST_INTR_ENABLED.with(|c| c.set(false))
    }
}

#[cfg(test)]
thread_local! {
    static TEST_INTR_ENABLED: core::cell::Cell<bool> = const { core::cell::Cell::new(true) };
}

/// Per-CPU state.
pub struct Cpu {
    /// Index of the process running on this CPU, or `None`.
    pub proc: Option<usize>,
    /// `swtch()` here to enter the scheduler loop.
    pub context: Context,
    /// Depth of `push_intr_off()` nesting.
    pub interrupt_disable_layers: u32,
    /// Were interrupts enabled before the first `push_intr_off()`?
    pub previous_interrupts_enabled: bool,
}
impl Cpu {
    pub const fn new() -> Cpu {
        Cpu {
            proc: None,
            context: Context::new(),
            interrupt_disable_layers: 0,
            previous_interrupts_enabled: false,
        }
    }
}
impl Default for Cpu {
    fn default() -> Cpu {
        Cpu::new()
    }
}

/// `push_intr_off`/`pop_intr_off` are like `intr_off()`/`intr_on()` except
/// matched: it takes two `pop_intr_off()`s to undo two `push_intr_off()`s,
/// and if interrupts were already off, the pair leaves them off.
pub fn push_intr_off(cpu: &mut Cpu) {
    let old = Hal::intr_get();
    Hal::intr_off();
    if cpu.interrupt_disable_layers == 0 {
        cpu.previous_interrupts_enabled = old;
    }
    cpu.interrupt_disable_layers += 1;
}

pub fn pop_intr_off(cpu: &mut Cpu) {
    if Hal::intr_get() {
        panic!("pop_intr_off - interruptible");
    }
    if cpu.interrupt_disable_layers < 1 {
        panic!("pop_intr_off");
    }
    cpu.interrupt_disable_layers -= 1;
    if cpu.interrupt_disable_layers == 0 && cpu.previous_interrupts_enabled {
        Hal::intr_on();
    }
}

/// All per-CPU state, indexed by a local-APIC-derived id (the reverse map
/// from APIC id to index is itself a collaborator lookup; here the caller
/// simply supplies its own CPU index directly since SMP affinity policy
/// is a non-goal).
pub struct Cpus {
    cpus: [Cpu; NCPU],
}
impl Cpus {
    pub const fn new() -> Cpus {
        Cpus {
            cpus: [const { Cpu::new() }; NCPU],
        }
    }
    pub fn get(&mut self, id: usize) -> &mut Cpu {
        &mut self.cpus[id]
    }
}
impl Default for Cpus {
    fn default() -> Cpus {
        Cpus::new()
    }
}
