/// Exception vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionVector(pub u8);

#[expect(non_upper_case_globals)]
impl ExceptionVector {
    /// Breakpoint (#BP), raised by `INT3`.
    pub const Breakpoint: Self = Self(3);
}

/// Information about an interrupt or exception.
#[derive(Debug, Clone, Copy)]
pub struct Interrupt {
    /// Vector number of the interrupt.
    pub vector: ExceptionVector,

    /// Length of the instruction that caused the interrupt.
    ///
    /// Needed to advance past the instruction when the interrupt is
    /// re-injected.
    pub instruction_length: u8,
}

impl Interrupt {
    /// Creates a new software breakpoint exception.
    pub fn breakpoint(instruction_length: u8) -> Self {
        Self {
            vector: ExceptionVector::Breakpoint,
            instruction_length,
        }
    }
}
