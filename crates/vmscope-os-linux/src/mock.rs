//! AMD64 guest memory mock for the bootstrap tests.

use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    time::Duration,
};

use vmscope_arch_amd64::{Amd64, EventReason};
use vmscope_core::{
    Architecture as _, EventTrigger, Gfn, Pa, VcpuId, VmiDriver, VmiError, VmiEvent, VmiInfo,
};

pub const PRESENT: u64 = 1 << 0;
pub const WRITE: u64 = 1 << 1;
pub const LARGE: u64 = 1 << 7;

#[derive(Default)]
pub struct MockGuest {
    pages: RefCell<HashMap<Gfn, Vec<u8>>>,
    pub root_register: Option<u64>,
    pub paravirtualized: bool,
    pub physical_address_extension: bool,
    pub events: RefCell<VecDeque<VmiEvent<Amd64>>>,
    pub armed: RefCell<Vec<EventTrigger<Amd64>>>,
    pub reinjections: RefCell<Vec<(VcpuId, bool)>>,
    pub reads: Cell<usize>,
}

impl MockGuest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_register(self, value: u64) -> Self {
        Self {
            root_register: Some(value),
            ..self
        }
    }

    pub fn with_paravirtualized(self, paravirtualized: bool) -> Self {
        Self {
            paravirtualized,
            ..self
        }
    }

    pub fn with_physical_address_extension(self, physical_address_extension: bool) -> Self {
        Self {
            physical_address_extension,
            ..self
        }
    }

    pub fn write_u32(&self, pa: u64, value: u32) {
        self.write(Pa(pa), &value.to_le_bytes());
    }

    pub fn write_u64(&self, pa: u64, value: u64) {
        self.write(Pa(pa), &value.to_le_bytes());
    }

    fn write(&self, pa: Pa, bytes: &[u8]) {
        let offset = Amd64::pa_offset(pa) as usize;
        let mut pages = self.pages.borrow_mut();
        let page = pages
            .entry(Amd64::gfn_from_pa(pa))
            .or_insert_with(|| vec![0u8; 4096]);
        page[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn push_event(&self, reason: EventReason) {
        self.events
            .borrow_mut()
            .push_back(VmiEvent::new(VcpuId(0), reason));
    }
}

impl VmiDriver for MockGuest {
    type Architecture = Amd64;

    fn info(&self) -> Result<VmiInfo, VmiError> {
        Ok(VmiInfo {
            page_size: 4096,
            page_shift: 12,
            max_gfn: Gfn(0xfffff),
            vcpus: 1,
            physical_address_extension: self.physical_address_extension,
        })
    }

    fn pause(&self) -> Result<(), VmiError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), VmiError> {
        Ok(())
    }

    fn read_physical(&self, pa: Pa, buffer: &mut [u8]) -> Result<(), VmiError> {
        self.reads.set(self.reads.get() + 1);

        let pages = self.pages.borrow();
        let page = pages
            .get(&Amd64::gfn_from_pa(pa))
            .ok_or(VmiError::OutOfBounds)?;
        let offset = Amd64::pa_offset(pa) as usize;
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
        self.root_register
    }

    fn is_paravirtualized(&self) -> bool {
        self.paravirtualized
    }

    fn monitor_enable(&self, trigger: EventTrigger<Amd64>) -> Result<(), VmiError> {
        self.armed.borrow_mut().push(trigger);
        Ok(())
    }

    fn monitor_disable(&self, trigger: EventTrigger<Amd64>) -> Result<(), VmiError> {
        self.armed.borrow_mut().retain(|armed| *armed != trigger);
        Ok(())
    }

    fn wait_for_event(&self, _timeout: Duration) -> Result<Option<VmiEvent<Amd64>>, VmiError> {
        Ok(self.events.borrow_mut().pop_front())
    }

    fn set_interrupt_reinjection(
        &self,
        event: &VmiEvent<Amd64>,
        reinject: bool,
    ) -> Result<(), VmiError> {
        self.reinjections
            .borrow_mut()
            .push((event.vcpu_id(), reinject));
        Ok(())
    }
}
