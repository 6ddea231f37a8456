//! Identity-mapped mock architecture, driver and OS for unit tests.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    time::Duration,
};

use crate::{
    Architecture, EventReason, EventTrigger, Gfn, InitError, KernelState, Pa, TranslationError,
    Va, VcpuId, VmiCore, VmiDriver, VmiError, VmiEvent, VmiInfo, VmiOs,
};

pub struct MockArch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPagingMode {
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockRegister {
    Cr0,
    Cr3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockVector(pub u8);

pub const BREAKPOINT: MockVector = MockVector(3);

#[derive(Debug, Clone, Copy)]
pub enum MockReason {
    Register(MockRegister),
    Interrupt(MockVector),
    Singlestep,
}

impl EventReason for MockReason {
    type Architecture = MockArch;

    fn trigger(&self) -> Option<EventTrigger<MockArch>> {
        match *self {
            Self::Register(register) => Some(EventTrigger::Register(register)),
            Self::Interrupt(vector) => Some(EventTrigger::Interrupt(vector)),
            Self::Singlestep => None,
        }
    }
}

impl Architecture for MockArch {
    const PAGE_SIZE: u64 = 0x1000;
    const PAGE_SHIFT: u64 = 12;
    const PAGE_MASK: u64 = !(Self::PAGE_SIZE - 1);

    type PagingMode = MockPagingMode;
    type PageTableLevel = ();
    type SpecialRegister = MockRegister;
    type InterruptVector = MockVector;
    type EventReason = MockReason;

    fn gfn_from_pa(pa: Pa) -> Gfn {
        Gfn(pa.0 >> Self::PAGE_SHIFT)
    }

    fn pa_from_gfn(gfn: Gfn) -> Pa {
        Pa(gfn.0 << Self::PAGE_SHIFT)
    }

    fn pa_offset(pa: Pa) -> u64 {
        pa.0 & !Self::PAGE_MASK
    }

    fn address_width(_mode: MockPagingMode) -> usize {
        8
    }

    /// Identity mapping; pages missing from the driver are not present.
    fn translate_address<Driver>(
        vmi: &VmiCore<Driver>,
        _mode: MockPagingMode,
        va: Va,
        root: Pa,
    ) -> Result<Pa, TranslationError>
    where
        Driver: VmiDriver<Architecture = Self>,
    {
        let mut probe = [0u8; 1];
        match vmi.read(Pa(va.0), &mut probe) {
            Ok(()) => Ok(Pa(va.0)),
            Err(VmiError::OutOfBounds) => Err(TranslationError::PageNotPresent {
                va,
                root,
                level: "flat",
            }),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct MockDriver {
    pub pages: RefCell<HashMap<Gfn, Vec<u8>>>,
    pub events: RefCell<VecDeque<Result<VmiEvent<MockArch>, VmiError>>>,
    pub waits: RefCell<Vec<Duration>>,
    pub armed: RefCell<Vec<EventTrigger<MockArch>>>,
    pub reinjections: RefCell<Vec<(VcpuId, bool)>>,
    pub fail_monitor: Cell<bool>,
    pub fail_reinjection: Cell<bool>,
    pub paused: Cell<u32>,
    pub resumed: Cell<u32>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            pages: RefCell::new(HashMap::new()),
            events: RefCell::new(VecDeque::new()),
            waits: RefCell::new(Vec::new()),
            armed: RefCell::new(Vec::new()),
            reinjections: RefCell::new(Vec::new()),
            fail_monitor: Cell::new(false),
            fail_reinjection: Cell::new(false),
            paused: Cell::new(0),
            resumed: Cell::new(0),
        }
    }

    pub fn insert_page(&self, gfn: Gfn, fill: u8) {
        self.pages.borrow_mut().insert(gfn, vec![fill; 0x1000]);
    }

    pub fn push_event(&self, reason: MockReason) {
        self.events
            .borrow_mut()
            .push_back(Ok(VmiEvent::new(VcpuId(0), reason)));
    }

    pub fn push_error(&self, err: VmiError) {
        self.events.borrow_mut().push_back(Err(err));
    }
}

impl VmiDriver for MockDriver {
    type Architecture = MockArch;

    fn info(&self) -> Result<VmiInfo, VmiError> {
        Ok(VmiInfo {
            page_size: 0x1000,
            page_shift: 12,
            max_gfn: Gfn(0xfffff),
            vcpus: 1,
            physical_address_extension: false,
        })
    }

    fn pause(&self) -> Result<(), VmiError> {
        self.paused.set(self.paused.get() + 1);
        Ok(())
    }

    fn resume(&self) -> Result<(), VmiError> {
        self.resumed.set(self.resumed.get() + 1);
        Ok(())
    }

    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        let pages = self.pages.borrow();
        let page = pages
            .get(&MockArch::gfn_from_pa(pa))
            .ok_or(VmiError::OutOfBounds)?;
        let offset = MockArch::pa_offset(pa) as usize;
        let chunk = page
            .get(offset..offset + buffer.len())
            .ok_or(VmiError::OutOfBounds)?;
        buffer.copy_from_slice(chunk);
        Ok(())
    }

    fn write_physical(&self, _pa: Pa, _buffer: &[u8]) -> Result<(), VmiError> {
        Err(VmiError::NotSupported)
    }

    fn current_root_register(&self) -> Option<u64> {
        None
    }

    fn is_paravirtualized(&self) -> bool {
        false
    }

    fn monitor_enable(&self, trigger: EventTrigger<MockArch>) -> Result<(), VmiError> {
        if self.fail_monitor.get() {
            return Err(VmiError::Other("monitor unavailable"));
        }

        self.armed.borrow_mut().push(trigger);
        Ok(())
    }

    fn monitor_disable(&self, trigger: EventTrigger<MockArch>) -> Result<(), VmiError> {
        if self.fail_monitor.get() {
            return Err(VmiError::Other("monitor unavailable"));
        }

        self.armed.borrow_mut().retain(|armed| *armed != trigger);
        Ok(())
    }

    fn wait_for_event(&self, timeout: Duration) -> Result<Option<VmiEvent<MockArch>>, VmiError> {
        self.waits.borrow_mut().push(timeout);
        self.events.borrow_mut().pop_front().transpose()
    }

    fn set_interrupt_reinjection(
        &self,
        event: &VmiEvent<MockArch>,
        reinject: bool,
    ) -> Result<(), VmiError> {
        if self.fail_reinjection.get() {
            return Err(VmiError::Other("re-injection rejected"));
        }

        self.reinjections
            .borrow_mut()
            .push((event.vcpu_id(), reinject));
        Ok(())
    }
}

pub struct MockOs {
    pub root: Pa,
}

impl VmiOs<MockDriver> for MockOs {
    fn locate_kernel(&self, _vmi: &VmiCore<MockDriver>) -> Result<KernelState<MockArch>, InitError> {
        Ok(KernelState::new(self.root, MockPagingMode::Flat))
    }
}

pub fn session() -> Result<crate::VmiSession<MockDriver, MockOs>, InitError> {
    crate::VmiSession::init(MockDriver::new(), MockOs { root: Pa(0x1000) })
}
