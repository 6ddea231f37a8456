use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use super::{EventDescriptor, InterruptWatch, ListenOutcome, RegisterWatch};
use crate::{
    EventTrigger, InitError, Pa, RegistrationError, Va, VcpuId, VmiError,
    mock::{self, BREAKPOINT, MockArch, MockReason, MockRegister, MockVector},
};

type Error = Box<dyn std::error::Error>;

const TIMEOUT: Duration = Duration::from_millis(50);

fn counter() -> (Rc<Cell<usize>>, impl FnMut(&super::VmiEventContext<'_, mock::MockDriver>)) {
    let hits = Rc::new(Cell::new(0));
    let callback = {
        let hits = hits.clone();
        move |_: &super::VmiEventContext<'_, mock::MockDriver>| hits.set(hits.get() + 1)
    };
    (hits, callback)
}

#[test]
fn init_pauses_and_resumes() -> Result<(), InitError> {
    let session = mock::session()?;

    assert_eq!(session.driver().paused.get(), 1);
    assert_eq!(session.driver().resumed.get(), 1);
    assert_eq!(session.kernel().root(), Pa(0x1000));

    Ok(())
}

#[test]
fn matching_notification_dispatches_once() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;

    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Dispatched(1)));
    assert_eq!(hits.get(), 1);

    // The source is exhausted; nothing is dispatched twice.
    let outcome = session.listen(Duration::ZERO);
    assert!(matches!(outcome, ListenOutcome::Timeout));
    assert_eq!(hits.get(), 1);

    session.teardown();
    Ok(())
}

#[test]
fn unmatched_notification_times_out() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;

    let driver = session.driver();
    driver.push_event(MockReason::Register(MockRegister::Cr0));
    driver.push_event(MockReason::Interrupt(BREAKPOINT));
    driver.push_event(MockReason::Singlestep);

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Timeout));
    assert_eq!(hits.get(), 0);
    assert!(session.driver().events.borrow().is_empty());

    session.teardown();
    Ok(())
}

#[test]
fn pending_notifications_are_drained() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (cr3_hits, cr3_callback) = counter();
    let (int3_hits, int3_callback) = counter();
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        cr3_callback,
    ))?;
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT),
        int3_callback,
    ))?;

    let driver = session.driver();
    driver.push_event(MockReason::Register(MockRegister::Cr3));
    driver.push_event(MockReason::Interrupt(MockVector(14)));
    driver.push_event(MockReason::Interrupt(BREAKPOINT));
    driver.push_event(MockReason::Register(MockRegister::Cr3));

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Dispatched(3)));
    assert_eq!(cr3_hits.get(), 2);
    assert_eq!(int3_hits.get(), 1);

    // Only the first wait may block; the rest only drain.
    let waits = session.driver().waits.borrow().clone();
    assert!(waits[0] <= TIMEOUT);
    assert!(waits[1..].iter().all(|wait| wait.is_zero()));

    session.teardown();
    Ok(())
}

#[test]
fn disabled_interrupt_watch_is_discarded() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT).with_enabled(false),
        callback,
    ))?;

    // A disabled watch does not arm the monitor.
    assert!(session.driver().armed.borrow().is_empty());

    session
        .driver()
        .push_event(MockReason::Interrupt(BREAKPOINT));

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Timeout));
    assert_eq!(hits.get(), 0);
    assert!(session.driver().reinjections.borrow().is_empty());

    session.teardown();
    Ok(())
}

#[test]
fn interrupt_reinjection_follows_policy() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT).with_reinject(true),
        callback,
    ))?;
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(MockVector(1)),
        |_| {},
    ))?;

    session
        .driver()
        .push_event(MockReason::Interrupt(BREAKPOINT));
    session
        .driver()
        .push_event(MockReason::Interrupt(MockVector(1)));

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Dispatched(2)));
    assert_eq!(hits.get(), 1);
    assert_eq!(
        *session.driver().reinjections.borrow(),
        [(VcpuId(0), true), (VcpuId(0), false)]
    );

    session.teardown();
    Ok(())
}

#[test]
fn reinjection_failure_stops_pass() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT).with_reinject(true),
        callback,
    ))?;

    session.driver().fail_reinjection.set(true);
    session
        .driver()
        .push_event(MockReason::Interrupt(BREAKPOINT));
    session
        .driver()
        .push_event(MockReason::Interrupt(BREAKPOINT));

    let outcome = session.listen(TIMEOUT);
    assert!(matches!(
        outcome,
        ListenOutcome::Error(VmiError::Other("re-injection rejected"))
    ));

    // The callback ran before re-injection failed; the second
    // notification is still pending.
    assert_eq!(hits.get(), 1);
    assert_eq!(session.driver().events.borrow().len(), 1);
    assert!(session.driver().reinjections.borrow().is_empty());

    session.driver().fail_reinjection.set(false);
    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Dispatched(1)));
    assert_eq!(hits.get(), 2);

    session.teardown();
    Ok(())
}

#[test]
fn register_watch_does_not_touch_reinjection() -> Result<(), Error> {
    let mut session = mock::session()?;

    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| {},
    ))?;

    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));

    let outcome = session.listen(TIMEOUT);
    assert_eq!(outcome.dispatched(), 1);
    assert!(session.driver().reinjections.borrow().is_empty());

    session.teardown();
    Ok(())
}

#[test]
fn channel_error_keeps_registry() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;

    session
        .driver()
        .push_error(VmiError::Other("event channel closed"));
    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));

    let outcome = session.listen(TIMEOUT);
    assert!(outcome.is_error());
    assert_eq!(hits.get(), 0);
    assert_eq!(session.registry().len(), 1);

    // The caller may listen again.
    let outcome = session.listen(TIMEOUT);
    assert!(matches!(outcome, ListenOutcome::Dispatched(1)));
    assert_eq!(hits.get(), 1);

    session.teardown();
    Ok(())
}

#[test]
fn callback_can_read_kernel_memory() -> Result<(), Error> {
    let mut session = mock::session()?;
    session.driver().insert_page(crate::Gfn(0x10), 0xab);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let callback = {
        let seen = seen.clone();
        move |ctx: &super::VmiEventContext<'_, mock::MockDriver>| {
            let mut buffer = [0u8; 2];
            if ctx.read_va(Va(0x10ffe), &mut buffer).is_ok() {
                seen.borrow_mut().extend_from_slice(&buffer);
            }
            seen.borrow_mut().push(ctx.event().vcpu_id().0 as u8);
        }
    };

    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;
    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));

    assert_eq!(session.listen(TIMEOUT).dispatched(), 1);
    assert_eq!(*seen.borrow(), [0xab, 0xab, 0]);

    session.teardown();
    Ok(())
}

#[test]
fn read_va_crosses_page_boundary() -> Result<(), Error> {
    let session = mock::session()?;
    session.driver().insert_page(crate::Gfn(0x20), 0x11);

    let mut buffer = [0u8; 4];
    let result = session.read_va(Va(0x20ffe), &mut buffer);
    assert!(matches!(result, Err(ref err) if err.is_page_not_present()));

    session.driver().insert_page(crate::Gfn(0x21), 0x22);
    session.read_va(Va(0x20ffe), &mut buffer)?;
    assert_eq!(buffer, [0x11, 0x11, 0x22, 0x22]);

    assert_eq!(session.read_u32_va(Va(0x20ffe))?, 0x22221111);
    assert_eq!(session.read_address_va(Va(0x21000))?, Va(0x2222222222222222));

    Ok(())
}

#[test]
fn failed_arming_rolls_back() -> Result<(), Error> {
    let mut session = mock::session()?;
    session.driver().fail_monitor.set(true);

    let result = session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| {},
    ));
    assert!(matches!(result, Err(RegistrationError::Driver(_))));
    assert!(session.registry().is_empty());

    session.driver().fail_monitor.set(false);
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| {},
    ))?;
    assert_eq!(
        *session.driver().armed.borrow(),
        [EventTrigger::Register(MockRegister::Cr3)]
    );

    session.teardown();
    Ok(())
}

#[test]
fn deregister_disarms_monitor() -> Result<(), Error> {
    let mut session = mock::session()?;

    let handle = session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT),
        |_| {},
    ))?;
    assert_eq!(session.driver().armed.borrow().len(), 1);

    session.deregister_event(handle)?;
    assert!(session.driver().armed.borrow().is_empty());

    session
        .driver()
        .push_event(MockReason::Interrupt(BREAKPOINT));
    assert!(matches!(session.listen(TIMEOUT), ListenOutcome::Timeout));

    Ok(())
}

#[test]
fn failed_disarm_keeps_registration() -> Result<(), Error> {
    let mut session = mock::session()?;

    let handle = session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| {},
    ))?;

    session.driver().fail_monitor.set(true);
    let result = session.deregister_event(handle);
    assert!(matches!(result, Err(RegistrationError::Driver(_))));
    assert_eq!(session.registry().len(), 1);
    assert!(session.registry().get(handle).is_some());
    assert_eq!(
        *session.driver().armed.borrow(),
        [EventTrigger::Register(MockRegister::Cr3)]
    );

    // Retrying once the monitor can be disarmed succeeds.
    session.driver().fail_monitor.set(false);
    session.deregister_event(handle)?;
    assert!(session.registry().is_empty());
    assert!(session.driver().armed.borrow().is_empty());

    assert!(matches!(
        session.deregister_event(handle),
        Err(RegistrationError::NotRegistered)
    ));

    Ok(())
}

#[test]
fn unbounded_timeout() -> Result<(), Error> {
    let mut session = mock::session()?;

    let (hits, callback) = counter();
    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;

    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));
    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));

    let outcome = session.listen(Duration::MAX);
    assert!(matches!(outcome, ListenOutcome::Dispatched(2)));
    assert_eq!(hits.get(), 2);
    assert_eq!(
        *session.driver().waits.borrow(),
        [Duration::MAX, Duration::ZERO, Duration::ZERO]
    );

    // Nothing pending: the driver reports no event and the pass ends.
    let outcome = session.listen(Duration::MAX);
    assert!(matches!(outcome, ListenOutcome::Timeout));

    session.teardown();
    Ok(())
}

#[test]
fn teardown_disarms_everything() -> Result<(), Error> {
    let mut session = mock::session()?;

    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| {},
    ))?;
    session.register_event(EventDescriptor::new(
        InterruptWatch::<MockArch>::new(BREAKPOINT),
        |_| {},
    ))?;
    assert_eq!(session.driver().armed.borrow().len(), 2);

    let driver = session.teardown();
    assert!(driver.armed.borrow().is_empty());

    Ok(())
}

#[test]
fn listen_until_stops_on_cancel() -> Result<(), Error> {
    let mut session = mock::session()?;

    let cancel = Rc::new(AtomicBool::new(false));
    let callback = {
        let cancel = cancel.clone();
        move |_: &super::VmiEventContext<'_, mock::MockDriver>| {
            cancel.store(true, Ordering::Relaxed)
        }
    };

    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        callback,
    ))?;

    // Already cancelled: no pass is made.
    let stopped = AtomicBool::new(true);
    assert_eq!(session.listen_until(Duration::ZERO, &stopped)?, 0);

    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));
    assert_eq!(session.listen_until(Duration::ZERO, &cancel)?, 1);

    session.teardown();
    Ok(())
}

#[test]
fn listen_until_propagates_channel_error() -> Result<(), Error> {
    let mut session = mock::session()?;

    session.driver().push_error(VmiError::NotSupported);

    let cancel = AtomicBool::new(false);
    let result = session.listen_until(Duration::ZERO, &cancel);
    assert!(matches!(result, Err(VmiError::NotSupported)));

    Ok(())
}

#[test]
fn overhead_accumulates() -> Result<(), Error> {
    let mut session = mock::session()?;

    session.register_event(EventDescriptor::new(
        RegisterWatch::<MockArch>::write(MockRegister::Cr3),
        |_| std::thread::sleep(Duration::from_millis(2)),
    ))?;

    assert!(session.event_processing_overhead().is_zero());

    session
        .driver()
        .push_event(MockReason::Register(MockRegister::Cr3));
    assert_eq!(session.listen(TIMEOUT).dispatched(), 1);
    assert!(session.event_processing_overhead() >= Duration::from_millis(2));

    session.teardown();
    Ok(())
}
