//! Scoped SIGINT/SIGABRT/SIGTERM handling that tears down tunnel processes.
//!
//! Tunnel processes run in their own process groups, so a Ctrl+C on the
//! terminal only reaches this process. While a [`SignalGuard`] is alive, a
//! guarded signal terminates every tracked group before the signal takes
//! its default effect. Groups are tracked in a fixed table of atomics so the
//! handler stays async-signal-safe.

use std::{future::Future, io};

#[cfg(unix)]
pub use self::imp::terminate_tracked;
pub(crate) use self::imp::{track, untrack};

/// What happens after the tracked process groups were terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AfterCleanup {
    /// Restore the default disposition and re-raise, ending this process
    #[default]
    Reraise,
    /// Keep running; the caller observes its tunnels dying
    Continue,
}

/// Installs the cleanup handlers for as long as it lives
///
/// Dropping the guard restores whatever handlers were installed before.
#[must_use = "the handlers are removed when the guard is dropped"]
pub struct SignalGuard {
    #[cfg(unix)]
    inner: imp::Installed,
}

impl SignalGuard {
    pub fn install() -> io::Result<Self> {
        Self::install_with(AfterCleanup::default())
    }

    pub fn install_with(after: AfterCleanup) -> io::Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                inner: imp::Installed::new(after)?,
            })
        }

        #[cfg(not(unix))]
        {
            let _ = after;
            Ok(Self {})
        }
    }
}

/// Run `action` with cleanup handlers installed, restoring them afterwards
pub async fn with_guard<F, T>(action: F) -> io::Result<T>
where
    F: Future<Output = T>,
{
    let _guard = SignalGuard::install()?;
    Ok(action.await)
}

#[cfg(unix)]
mod imp {
    use std::{
        ffi::c_int,
        io,
        sync::atomic::{AtomicBool, AtomicI32, Ordering},
    };

    use nix::{
        sys::signal::{
            SaFlags, SigAction, SigHandler, SigSet, Signal, killpg, raise, sigaction, signal,
        },
        unistd::Pid,
    };
    use tracing::{debug, warn};

    use super::AfterCleanup;

    const GUARDED: [Signal; 3] = [Signal::SIGINT, Signal::SIGABRT, Signal::SIGTERM];
    const MAX_TRACKED: usize = 64;

    static TRACKED: [AtomicI32; MAX_TRACKED] = [const { AtomicI32::new(0) }; MAX_TRACKED];
    static RERAISE: AtomicBool = AtomicBool::new(true);

    /// Remember a process group for cleanup on a guarded signal
    pub(crate) fn track(pgid: u32) {
        let Ok(pgid) = i32::try_from(pgid) else {
            return;
        };
        let slot = TRACKED.iter().find(|slot| {
            slot.compare_exchange(0, pgid, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        });
        if slot.is_none() {
            warn!("Too many tunnel processes to track; pgid {} left unguarded", pgid);
        }
    }

    pub(crate) fn untrack(pgid: u32) {
        let Ok(pgid) = i32::try_from(pgid) else {
            return;
        };
        for slot in &TRACKED {
            let _ = slot.compare_exchange(pgid, 0, Ordering::SeqCst, Ordering::SeqCst);
        }
    }

    /// SIGTERM every tracked process group, each at most once
    ///
    /// Returns how many groups were signalled. Groups that already exited
    /// are skipped silently.
    pub fn terminate_tracked() -> usize {
        let mut signalled = 0;
        for slot in &TRACKED {
            let pgid = slot.swap(0, Ordering::SeqCst);
            if pgid > 0 && killpg(Pid::from_raw(pgid), Signal::SIGTERM).is_ok() {
                signalled += 1;
            }
        }
        signalled
    }

    extern "C" fn on_signal(signum: c_int) {
        terminate_tracked();

        if RERAISE.load(Ordering::SeqCst)
            && let Ok(sig) = Signal::try_from(signum)
        {
            // SAFETY: resetting to the default disposition installs no Rust code.
            unsafe {
                let _ = signal(sig, SigHandler::SigDfl);
            }
            let _ = raise(sig);
        }
    }

    pub(super) struct Installed {
        previous: Vec<(Signal, SigAction)>,
        previous_reraise: bool,
    }

    impl Installed {
        pub(super) fn new(after: AfterCleanup) -> io::Result<Self> {
            let previous_reraise =
                RERAISE.swap(after == AfterCleanup::Reraise, Ordering::SeqCst);
            let action = SigAction::new(
                SigHandler::Handler(on_signal),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );

            let mut installed = Self {
                previous: Vec::with_capacity(GUARDED.len()),
                previous_reraise,
            };
            for sig in GUARDED {
                // SAFETY: the handler only touches atomics and async-signal-safe calls.
                let previous = unsafe { sigaction(sig, &action) }.map_err(io::Error::from)?;
                installed.previous.push((sig, previous));
            }

            debug!("Signal guard installed");
            Ok(installed)
        }
    }

    impl Drop for Installed {
        fn drop(&mut self) {
            for (sig, previous) in self.previous.drain(..).rev() {
                // SAFETY: reinstating the action that was in place before.
                if let Err(e) = unsafe { sigaction(sig, &previous) } {
                    warn!("Failed to restore handler for {}: {}", sig, e);
                }
            }
            RERAISE.store(self.previous_reraise, Ordering::SeqCst);
            debug!("Signal guard removed");
        }
    }
}

#[cfg(not(unix))]
mod imp {
    pub(crate) fn track(_pgid: u32) {}

    pub(crate) fn untrack(_pgid: u32) {}
}

#[cfg(all(test, unix))]
mod tests {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
    use serial_test::serial;

    use super::*;

    fn current_handler(sig: Signal) -> SigHandler {
        let default_action = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        unsafe {
            let current = sigaction(sig, &default_action).unwrap();
            sigaction(sig, &current).unwrap();
            current.handler()
        }
    }

    #[test]
    #[serial]
    fn test_guard_installs_and_restores() {
        let before = current_handler(Signal::SIGTERM);

        {
            let _guard = SignalGuard::install_with(AfterCleanup::Continue).unwrap();
            for sig in [Signal::SIGINT, Signal::SIGABRT, Signal::SIGTERM] {
                assert!(matches!(current_handler(sig), SigHandler::Handler(_)));
            }
        }

        assert_eq!(current_handler(Signal::SIGTERM), before);
    }

    #[tokio::test]
    #[serial]
    async fn test_with_guard_restores_after_action() {
        let before = current_handler(Signal::SIGINT);

        let value = with_guard(async {
            assert!(matches!(
                current_handler(Signal::SIGINT),
                SigHandler::Handler(_)
            ));
            42
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(current_handler(Signal::SIGINT), before);
    }
}
