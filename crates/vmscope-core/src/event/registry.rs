use indexmap::IndexMap;

use super::{EventDescriptor, EventHandle, EventWatch, RegisterAccess};
use crate::{EventTrigger, RegistrationError, VmiDriver};

struct Registration<Driver>
where
    Driver: VmiDriver,
{
    handle: EventHandle,
    descriptor: EventDescriptor<Driver>,
}

/// The set of registered event descriptors of a session.
///
/// At most one descriptor is registered per [`EventTrigger`]. Entries keep
/// their registration order.
pub struct EventRegistry<Driver>
where
    Driver: VmiDriver,
{
    entries: IndexMap<EventTrigger<Driver::Architecture>, Registration<Driver>>,
    next_handle: u64,
}

impl<Driver> Default for EventRegistry<Driver>
where
    Driver: VmiDriver,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Driver> EventRegistry<Driver>
where
    Driver: VmiDriver,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
            next_handle: 0,
        }
    }

    /// Registers an event descriptor.
    ///
    /// On failure the registry is left unchanged.
    pub fn register(
        &mut self,
        descriptor: EventDescriptor<Driver>,
    ) -> Result<EventHandle, RegistrationError> {
        if let EventWatch::Register(watch) = descriptor.watch()
            && watch.access != RegisterAccess::WRITE
        {
            return Err(RegistrationError::UnsupportedAccessDirection);
        }

        let trigger = descriptor.trigger();
        if self.entries.contains_key(&trigger) {
            return Err(RegistrationError::AlreadyRegistered);
        }

        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;

        tracing::debug!(?trigger, ?handle, "event registered");
        self.entries
            .insert(trigger, Registration { handle, descriptor });

        Ok(handle)
    }

    /// Removes the descriptor registered under `handle`.
    pub fn deregister(
        &mut self,
        handle: EventHandle,
    ) -> Result<EventDescriptor<Driver>, RegistrationError> {
        let index = self
            .entries
            .values()
            .position(|registration| registration.handle == handle)
            .ok_or(RegistrationError::NotRegistered)?;

        let (trigger, registration) = self
            .entries
            .shift_remove_index(index)
            .ok_or(RegistrationError::NotRegistered)?;

        tracing::debug!(?trigger, ?handle, "event deregistered");
        Ok(registration.descriptor)
    }

    /// Returns the descriptor registered under `handle`.
    pub fn get(&self, handle: EventHandle) -> Option<&EventDescriptor<Driver>> {
        self.entries
            .values()
            .find(|registration| registration.handle == handle)
            .map(|registration| &registration.descriptor)
    }

    /// Returns the descriptor matching `trigger`.
    pub fn find_mut(
        &mut self,
        trigger: &EventTrigger<Driver::Architecture>,
    ) -> Option<&mut EventDescriptor<Driver>> {
        self.entries
            .get_mut(trigger)
            .map(|registration| &mut registration.descriptor)
    }

    /// Returns `true` if a descriptor is registered for `trigger`.
    pub fn contains(&self, trigger: &EventTrigger<Driver::Architecture>) -> bool {
        self.entries.contains_key(trigger)
    }

    /// Returns the number of registered descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over registered descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (EventHandle, &EventDescriptor<Driver>)> {
        self.entries
            .values()
            .map(|registration| (registration.handle, &registration.descriptor))
    }

    /// Removes every descriptor, in registration order.
    pub fn drain(&mut self) -> impl Iterator<Item = (EventHandle, EventDescriptor<Driver>)> + '_ {
        self.entries
            .drain(..)
            .map(|(_, registration)| (registration.handle, registration.descriptor))
    }
}

impl<Driver> Drop for EventRegistry<Driver>
where
    Driver: VmiDriver,
{
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            tracing::warn!(
                events = self.entries.len(),
                "event registry dropped without teardown"
            );
        }
    }
}
