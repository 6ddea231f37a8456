use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use super::{EventRegistry, ListenOutcome, VmiEvent, VmiEventContext};
use crate::{EventReason as _, KernelState, VmiCore, VmiDriver, VmiError};

/// Adds the time spent between creation and drop to an accumulator.
pub(crate) struct OverheadGuard<'a> {
    total: &'a Cell<Duration>,
    start: Instant,
}

impl<'a> OverheadGuard<'a> {
    pub(crate) fn new(total: &'a Cell<Duration>) -> Self {
        Self {
            total,
            start: Instant::now(),
        }
    }
}

impl Drop for OverheadGuard<'_> {
    fn drop(&mut self) {
        let elapsed = Instant::now().duration_since(self.start);
        self.total.set(self.total.get() + elapsed);
    }
}

/// Runs one pass over the driver's event channel.
///
/// The first wait blocks for at most `timeout`. Once a callback has been
/// invoked, further waits only drain notifications that are already
/// pending. The call never waits beyond its deadline. A `timeout` too
/// large to be represented as an [`Instant`] has no deadline.
pub(crate) fn listen<Driver>(
    vmi: &VmiCore<Driver>,
    kernel: &KernelState<Driver::Architecture>,
    registry: &mut EventRegistry<Driver>,
    timeout: Duration,
    overhead: &Cell<Duration>,
) -> ListenOutcome
where
    Driver: VmiDriver,
{
    let deadline = Instant::now().checked_add(timeout);
    let mut dispatched = 0;

    loop {
        let budget = match (dispatched, deadline) {
            (0, Some(deadline)) => deadline.saturating_duration_since(Instant::now()),
            (0, None) => timeout,
            _ => Duration::ZERO,
        };

        let event = match vmi.driver().wait_for_event(budget) {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(%err, dispatched, "event channel failed");
                return ListenOutcome::Error(err);
            }
        };

        let _overhead_guard = OverheadGuard::new(overhead);

        match dispatch(vmi, kernel, registry, &event) {
            Ok(true) => dispatched += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(%err, dispatched, "interrupt re-injection failed");
                return ListenOutcome::Error(err);
            }
        }

        if let Some(deadline) = deadline
            && Instant::now() >= deadline
        {
            break;
        }
    }

    match dispatched {
        0 => ListenOutcome::Timeout,
        n => ListenOutcome::Dispatched(n),
    }
}

/// Invokes the callback registered for `event`, if any.
///
/// Returns `true` if a callback was invoked.
fn dispatch<Driver>(
    vmi: &VmiCore<Driver>,
    kernel: &KernelState<Driver::Architecture>,
    registry: &mut EventRegistry<Driver>,
    event: &VmiEvent<Driver::Architecture>,
) -> Result<bool, VmiError>
where
    Driver: VmiDriver,
{
    let trigger = match event.reason().trigger() {
        Some(trigger) => trigger,
        None => {
            tracing::trace!(?event, "unarmed event class");
            return Ok(false);
        }
    };

    let descriptor = match registry.find_mut(&trigger) {
        Some(descriptor) if descriptor.watch().enabled() => descriptor,
        Some(_) => {
            tracing::trace!(?trigger, "event disabled");
            return Ok(false);
        }
        None => {
            tracing::trace!(?trigger, "event not registered");
            return Ok(false);
        }
    };

    tracing::trace!(?trigger, vcpu_id = %event.vcpu_id(), "dispatching event");
    descriptor.invoke(&VmiEventContext::new(vmi, kernel, event));

    if event.reason().is_interrupt()
        && let Some(reinject) = descriptor.watch().reinject()
    {
        vmi.driver().set_interrupt_reinjection(event, reinject)?;
    }

    Ok(true)
}
