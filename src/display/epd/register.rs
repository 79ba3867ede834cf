//! Controller registers of the 7.3" ACeP panel, in the order the init
//! sequence touches them.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    CommandHeader = 0xAA,
    PowerSetting = 0x01,
    PanelSetting = 0x00,
    PowerOffSequence = 0x03,
    BoosterSoftStart1 = 0x05,
    BoosterSoftStart2 = 0x06,
    BoosterSoftStart3 = 0x08,
    ImageProcess = 0x13,
    PllControl = 0x30,
    TempSensorEnable = 0x41,
    /// VCOM and data interval
    VcomDataInterval = 0x50,
    /// Gate/source non-overlap period
    Tcon = 0x60,
    Resolution = 0x61,
    VcomDc = 0x82,
    TempVcomDc = 0x84,
    Agid = 0x86,
    PowerSaving = 0xE3,
    Cascade = 0xE0,
    TempSensorSetting = 0xE6,

    /// Pixel data follows as 4bpp
    DataStart = 0x10,
    PowerOn = 0x04,
    DisplayRefresh = 0x12,
    PowerOff = 0x02,
    /// Needs the 0xA5 check byte
    DeepSleep = 0x07,
}

impl From<Register> for u8 {
    fn from(reg: Register) -> u8 {
        reg as u8
    }
}
