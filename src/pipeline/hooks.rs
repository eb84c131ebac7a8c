//! Host environment hooks suspended for the length of a run.

use crate::core::Result;

/// Host environment integration around a run.
///
/// Desktop build hosts often watch the project and recompile or reload on
/// file changes. A run writes into the project tree, so that behavior is
/// suspended for the duration of the run and restored afterwards.
pub trait HostHooks: Send + Sync {
    /// Stop automatic refresh and recompilation.
    fn suspend_auto_refresh(&self) -> Result<()>;

    /// Restore automatic refresh. Must be safe to call after a failed suspend.
    fn resume_auto_refresh(&self);
}

/// Hooks for hosts without automatic refresh.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl HostHooks for NoopHooks {
    fn suspend_auto_refresh(&self) -> Result<()> {
        Ok(())
    }

    fn resume_auto_refresh(&self) {}
}

/// Restores automatic refresh when dropped, on every exit path.
pub struct SuspendGuard<'a> {
    hooks: &'a dyn HostHooks,
}

impl<'a> SuspendGuard<'a> {
    /// Suspend automatic refresh until the guard is dropped.
    ///
    /// If suspending fails, refresh is restored before the error is returned.
    pub fn new(hooks: &'a dyn HostHooks) -> Result<Self> {
        if let Err(e) = hooks.suspend_auto_refresh() {
            hooks.resume_auto_refresh();
            return Err(e);
        }
        tracing::debug!("Suspended host auto refresh");
        Ok(Self {
            hooks,
        })
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        self.hooks.resume_auto_refresh();
        tracing::debug!("Resumed host auto refresh");
    }
}
