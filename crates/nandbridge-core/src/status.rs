//! NAND status register

use bitflags::bitflags;

bitflags! {
    /// Status register bits returned by READ STATUS (0x70)
    ///
    /// The register is never cached; each read reflects the chip's current
    /// state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// WP# is high, program and erase are allowed
        const WRITE_ENABLED       = 0x80;
        /// Device is ready (RDY)
        const READY               = 0x40;
        /// Internal ECC corrected enough bits that the page should be rewritten
        const REWRITE_RECOMMENDED = 0x08;
        /// Previous cached operation failed (FAILC)
        const CACHED_ERROR        = 0x02;
        /// Last operation failed (FAIL)
        const ERROR               = 0x01;
    }
}

impl Status {
    /// Build from a raw register byte, keeping unknown bits
    pub const fn from_raw(raw: u8) -> Self {
        Self::from_bits_retain(raw)
    }

    /// Is the device ready for a new command?
    pub const fn is_ready(&self) -> bool {
        self.contains(Self::READY)
    }

    /// Did the last operation fail?
    pub const fn is_error(&self) -> bool {
        self.contains(Self::ERROR)
    }

    /// Is programming/erasing allowed?
    pub const fn is_write_enabled(&self) -> bool {
        self.contains(Self::WRITE_ENABLED)
    }

    /// Should the last read page be rewritten?
    pub const fn rewrite_recommended(&self) -> bool {
        self.contains(Self::REWRITE_RECOMMENDED)
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:02X}", self.bits())?;
        let names = [
            (Self::WRITE_ENABLED, "WE"),
            (Self::READY, "RDY"),
            (Self::REWRITE_RECOMMENDED, "REWRITE"),
            (Self::CACHED_ERROR, "FAILC"),
            (Self::ERROR, "FAIL"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                write!(f, "{}{}", if first { " [" } else { "|" }, name)?;
                first = false;
            }
        }
        if !first {
            write!(f, "]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_meanings() {
        let s = Status::from_raw(0x41);
        assert!(s.is_ready());
        assert!(s.is_error());
        assert!(!s.is_write_enabled());

        let s = Status::from_raw(0xC0);
        assert!(s.is_ready());
        assert!(s.is_write_enabled());
        assert!(!s.is_error());

        assert!(!Status::from_raw(0x01).is_ready());
        assert!(Status::from_raw(0x48).rewrite_recommended());
    }

    #[test]
    fn test_unknown_bits_retained() {
        assert_eq!(Status::from_raw(0x24).bits(), 0x24);
    }
}
