use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::RomError;

/// Bytes in the vector table ($FFE0-$FFFF in bank 0).
pub const VECTORS_SIZE: usize = 0x20;

/// Value of a vector the cart doesn't use.
pub const UNUSED_VECTOR: u16 = 0xFFFF;

/// `Vector` names each interrupt vector the 65816 reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Vector {
    /// Native mode COP ($FFE4).
    NativeCop,
    /// Native mode BRK ($FFE6).
    NativeBrk,
    /// Native mode ABORT ($FFE8).
    NativeAbort,
    /// Native mode NMI ($FFEA).
    NativeNmi,
    /// Native mode IRQ ($FFEE).
    NativeIrq,
    /// Emulation mode COP ($FFF4).
    EmuCop,
    /// Emulation mode ABORT ($FFF8).
    EmuAbort,
    /// Emulation mode NMI ($FFFA).
    EmuNmi,
    /// RESET ($FFFC).
    Reset,
    /// Emulation mode IRQ and BRK ($FFFE).
    EmuIrq,
}

impl Vector {
    /// Offset of the vector within the table.
    #[must_use]
    pub fn offset(self) -> usize {
        match self {
            Vector::NativeCop => 0x04,
            Vector::NativeBrk => 0x06,
            Vector::NativeAbort => 0x08,
            Vector::NativeNmi => 0x0A,
            Vector::NativeIrq => 0x0E,
            Vector::EmuCop => 0x14,
            Vector::EmuAbort => 0x18,
            Vector::EmuNmi => 0x1A,
            Vector::Reset => 0x1C,
            Vector::EmuIrq => 0x1E,
        }
    }
}

/// `Vectors` holds every vector. Anything a cart doesn't use is
/// `UNUSED_VECTOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vectors {
    /// Native COP.
    pub native_cop: u16,
    /// Native BRK.
    pub native_brk: u16,
    /// Native ABORT.
    pub native_abort: u16,
    /// Native NMI.
    pub native_nmi: u16,
    /// Native IRQ.
    pub native_irq: u16,
    /// Emulation COP.
    pub emu_cop: u16,
    /// Emulation ABORT.
    pub emu_abort: u16,
    /// Emulation NMI.
    pub emu_nmi: u16,
    /// Code entry point.
    pub reset: u16,
    /// Emulation IRQ/BRK.
    pub emu_irq: u16,
}

impl Default for Vectors {
    fn default() -> Self {
        Self::new(UNUSED_VECTOR)
    }
}

impl Vectors {
    /// A table with only RESET set.
    #[must_use]
    pub fn new(reset: u16) -> Self {
        Self {
            native_cop: UNUSED_VECTOR,
            native_brk: UNUSED_VECTOR,
            native_abort: UNUSED_VECTOR,
            native_nmi: UNUSED_VECTOR,
            native_irq: UNUSED_VECTOR,
            emu_cop: UNUSED_VECTOR,
            emu_abort: UNUSED_VECTOR,
            emu_nmi: UNUSED_VECTOR,
            reset,
            emu_irq: UNUSED_VECTOR,
        }
    }

    fn slot(&mut self, v: Vector) -> &mut u16 {
        match v {
            Vector::NativeCop => &mut self.native_cop,
            Vector::NativeBrk => &mut self.native_brk,
            Vector::NativeAbort => &mut self.native_abort,
            Vector::NativeNmi => &mut self.native_nmi,
            Vector::NativeIrq => &mut self.native_irq,
            Vector::EmuCop => &mut self.emu_cop,
            Vector::EmuAbort => &mut self.emu_abort,
            Vector::EmuNmi => &mut self.emu_nmi,
            Vector::Reset => &mut self.reset,
            Vector::EmuIrq => &mut self.emu_irq,
        }
    }

    /// Read one vector.
    #[must_use]
    pub fn get(&self, v: Vector) -> u16 {
        match v {
            Vector::NativeCop => self.native_cop,
            Vector::NativeBrk => self.native_brk,
            Vector::NativeAbort => self.native_abort,
            Vector::NativeNmi => self.native_nmi,
            Vector::NativeIrq => self.native_irq,
            Vector::EmuCop => self.emu_cop,
            Vector::EmuAbort => self.emu_abort,
            Vector::EmuNmi => self.emu_nmi,
            Vector::Reset => self.reset,
            Vector::EmuIrq => self.emu_irq,
        }
    }

    /// Set one vector.
    pub fn set(&mut self, v: Vector, addr: u16) {
        *self.slot(v) = addr;
    }

    /// Parse a 32 byte vector table.
    ///
    /// # Errors
    /// `TooSmall` if fewer than `VECTORS_SIZE` bytes are given.
    pub fn parse(table: &[u8]) -> Result<Self, RomError> {
        if table.len() < VECTORS_SIZE {
            return Err(RomError::TooSmall {
                len: table.len(),
                need: VECTORS_SIZE,
            });
        }
        let mut v = Self::default();
        for which in Vector::iter() {
            v.set(which, LittleEndian::read_u16(&table[which.offset()..]));
        }
        Ok(v)
    }

    /// Write every named vector into a table. The reserved slots are left
    /// as they were.
    ///
    /// # Errors
    /// `TooSmall` if fewer than `VECTORS_SIZE` bytes are given.
    pub fn write_table(&self, table: &mut [u8]) -> Result<(), RomError> {
        if table.len() < VECTORS_SIZE {
            return Err(RomError::TooSmall {
                len: table.len(),
                need: VECTORS_SIZE,
            });
        }
        for which in Vector::iter() {
            LittleEndian::write_u16(&mut table[which.offset()..], self.get(which));
        }
        Ok(())
    }
}
