//! Buffer usage flags.
//!
//! Usage bits follow the Android gralloc layout so that values coming from
//! the composer plugin layer can be passed through unchanged. Bits 24..27
//! hold a vendor "rotation" field that carries one enumerated request rather
//! than independent flags, and bit 30 is the private AFBC padding request.

/// Usage flags attached to an allocation request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Usage(pub u32);

impl Usage {
    /// CPU read mask.
    pub const SW_READ_MASK: u32 = 0x0000_000F;
    /// CPU reads rarely.
    pub const SW_READ_RARELY: u32 = 0x0000_0002;
    /// CPU reads often.
    pub const SW_READ_OFTEN: u32 = 0x0000_0003;
    /// CPU write mask.
    pub const SW_WRITE_MASK: u32 = 0x0000_00F0;
    /// CPU writes rarely.
    pub const SW_WRITE_RARELY: u32 = 0x0000_0020;
    /// CPU writes often.
    pub const SW_WRITE_OFTEN: u32 = 0x0000_0030;
    /// Sampled as a GPU texture.
    pub const HW_TEXTURE: u32 = 0x0000_0100;
    /// Rendered to by the GPU.
    pub const HW_RENDER: u32 = 0x0000_0200;
    /// Composed by the hardware composer.
    pub const HW_COMPOSER: u32 = 0x0000_0800;
    /// Framebuffer target.
    pub const HW_FB: u32 = 0x0000_1000;
    /// Content protected; must never be CPU mapped.
    pub const PROTECTED: u32 = 0x0000_4000;
    /// Consumed by a video encoder.
    pub const HW_VIDEO_ENCODER: u32 = 0x0001_0000;
    /// Written by the camera.
    pub const HW_CAMERA_WRITE: u32 = 0x0002_0000;
    /// Read by the camera.
    pub const HW_CAMERA_READ: u32 = 0x0004_0000;

    /// Vendor request field.
    pub const VENDOR_FIELD_MASK: u32 = 0x0F00_0000;
    /// Vendor request: physically contiguous memory.
    pub const VENDOR_PHYSICALLY_CONTIGUOUS: u32 = 0x0800_0000;
    /// Vendor request: prefer an AFBC compressed layout.
    pub const VENDOR_USE_AFBC: u32 = 0x0900_0000;
    /// Vendor request: use the ARM P010 layout for 10-bit NV12.
    pub const VENDOR_USE_ARM_P010: u32 = 0x0A00_0000;

    /// Pad each AFBC header row to 64 bytes.
    pub const AFBC_PADDING: u32 = 0x4000_0000;

    /// Empty usage.
    #[inline]
    pub const fn empty() -> Self {
        Usage(0)
    }

    /// Wrap raw usage bits.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Usage(raw)
    }

    /// Raw bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns a copy with `bits` set.
    #[inline]
    pub const fn with(self, bits: u32) -> Self {
        Usage(self.0 | bits)
    }

    /// Returns a copy with the vendor field replaced by `value`.
    #[inline]
    pub const fn with_vendor_request(self, value: u32) -> Self {
        Usage((self.0 & !Self::VENDOR_FIELD_MASK) | (value & Self::VENDOR_FIELD_MASK))
    }

    /// True if every bit of `bits` is set.
    #[inline]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }

    /// True if the CPU reads or writes the buffer directly.
    #[inline]
    pub const fn has_cpu_access(self) -> bool {
        self.0 & (Self::SW_READ_MASK | Self::SW_WRITE_MASK) != 0
    }

    /// True if the CPU reads the buffer often, which asks for a cached mapping.
    #[inline]
    pub const fn cpu_reads_often(self) -> bool {
        self.0 & Self::SW_READ_MASK == Self::SW_READ_OFTEN
    }

    /// True for protected (secure) buffers.
    #[inline]
    pub const fn is_protected(self) -> bool {
        self.0 & Self::PROTECTED != 0
    }

    /// True for the framebuffer target.
    #[inline]
    pub const fn is_framebuffer(self) -> bool {
        self.0 & Self::HW_FB != 0
    }

    /// The vendor request field, isolated.
    #[inline]
    pub const fn vendor_request(self) -> u32 {
        self.0 & Self::VENDOR_FIELD_MASK
    }

    /// True if the vendor field asks for physically contiguous memory.
    #[inline]
    pub const fn wants_contiguous(self) -> bool {
        self.vendor_request() == Self::VENDOR_PHYSICALLY_CONTIGUOUS
    }

    /// True if the vendor field asks for AFBC.
    #[inline]
    pub const fn wants_afbc(self) -> bool {
        self.vendor_request() == Self::VENDOR_USE_AFBC
    }

    /// True if the vendor field asks for ARM P010.
    #[inline]
    pub const fn wants_arm_p010(self) -> bool {
        self.vendor_request() == Self::VENDOR_USE_ARM_P010
    }

    /// True if AFBC header rows should be padded.
    #[inline]
    pub const fn wants_afbc_padding(self) -> bool {
        self.0 & Self::AFBC_PADDING != 0
    }
}

impl From<u32> for Usage {
    fn from(raw: u32) -> Self {
        Usage(raw)
    }
}
