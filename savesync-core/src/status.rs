/*!
Host-owned status register shared with the coordinator.

The register carries two independent fields: the host's lifecycle state and
the import "settled" flag. The host writes the lifecycle; the coordinator
only reads it and toggles the settled flag around imports.
*/

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Run state of the host application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Lifecycle {
    #[default]
    Idle = 0,
    Running = 1,
    Paused = 2,
    Error = 3,
}

impl Lifecycle {
    fn from_raw(raw: u8) -> Self {
        match raw & 0x3 {
            0 => Lifecycle::Idle,
            1 => Lifecycle::Running,
            2 => Lifecycle::Paused,
            _ => Lifecycle::Error,
        }
    }
}

/// Lifecycle state plus import completion flag
///
/// Created once at application start (`Idle`, settled) and shared by
/// `Arc` between the host and the coordinator.
#[derive(Debug)]
pub struct StatusRegister {
    lifecycle: AtomicU8,
    settled: AtomicBool,
}

impl Default for StatusRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusRegister {
    pub fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(Lifecycle::Idle as u8),
            settled: AtomicBool::new(true),
        }
    }

    /// Snapshot of both fields
    pub fn read(&self) -> (Lifecycle, bool) {
        (self.lifecycle(), self.is_settled())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_raw(self.lifecycle.load(Ordering::SeqCst))
    }

    /// Byte-level save work is only allowed while running
    pub fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::SeqCst)
    }

    /// Host-side lifecycle transition. The coordinator never calls this.
    pub fn set_lifecycle(&self, lifecycle: Lifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::SeqCst);
    }

    /// Mark an import as accepted with its result pending
    pub fn clear_settled(&self) {
        self.settled.store(false, Ordering::SeqCst);
    }

    /// Mark the import path as terminal, whatever the outcome
    pub fn set_settled(&self) {
        self.settled.store(true, Ordering::SeqCst);
    }

    /// Clear the settled flag and return a guard that sets it again on drop
    ///
    /// Holding the guard for the whole import makes every exit path
    /// (including `?` returns and a dropped future) settle exactly once.
    pub fn begin_import(&self) -> SettledGuard<'_> {
        self.clear_settled();
        SettledGuard { register: self }
    }
}

/// Restores the settled flag when an import finishes
#[must_use = "dropping the guard immediately settles the import"]
#[derive(Debug)]
pub struct SettledGuard<'a> {
    register: &'a StatusRegister,
}

impl Drop for SettledGuard<'_> {
    fn drop(&mut self) {
        self.register.set_settled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_register_is_idle_and_settled() {
        let status = StatusRegister::new();
        assert_eq!(status.read(), (Lifecycle::Idle, true));
        assert!(!status.is_running());
    }

    #[test]
    fn test_lifecycle_and_settled_are_independent() {
        let status = StatusRegister::new();
        status.set_lifecycle(Lifecycle::Running);
        status.clear_settled();
        assert_eq!(status.read(), (Lifecycle::Running, false));

        status.set_lifecycle(Lifecycle::Paused);
        assert!(!status.is_settled());

        status.set_settled();
        assert_eq!(status.read(), (Lifecycle::Paused, true));
    }

    #[test]
    fn test_lifecycle_round_trip() {
        let status = StatusRegister::new();
        for lifecycle in [
            Lifecycle::Idle,
            Lifecycle::Running,
            Lifecycle::Paused,
            Lifecycle::Error,
        ] {
            status.set_lifecycle(lifecycle);
            assert_eq!(status.lifecycle(), lifecycle);
        }
    }

    #[test]
    fn test_guard_settles_on_drop() {
        let status = StatusRegister::new();
        {
            let _guard = status.begin_import();
            assert!(!status.is_settled());
        }
        assert!(status.is_settled());
    }

    #[test]
    fn test_guard_settles_on_early_return() {
        fn load(ok: bool) -> Result<u8, &'static str> {
            if ok {
                Ok(1)
            } else {
                Err("adapter failed")
            }
        }

        fn fails(status: &StatusRegister) -> Result<u8, &'static str> {
            let _guard = status.begin_import();
            let value = load(false)?;
            Ok(value)
        }

        let status = StatusRegister::new();
        assert!(fails(&status).is_err());
        assert!(status.is_settled());
    }
}
