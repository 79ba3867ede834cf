//! Driver for the Waveshare 7.3inch e-Paper HAT (F), a 7-color ACeP panel.
//!
//! Generic over embedded-hal 1.0 so the same code runs on Linux spidev
//! (see `display::linux`) and against recording fakes in tests.

mod register;

pub use register::Register;

use super::{DisplayDriver, DisplayError};
use crate::palette::Palette;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use image::RgbImage;
use std::time::Duration;

/// Display width in pixels
pub const WIDTH: u32 = 800;
/// Display height in pixels
pub const HEIGHT: u32 = 480;
/// Buffer size: 4 bits per pixel, 2 pixels per byte
pub const BUFFER_SIZE: usize = (WIDTH as usize * HEIGHT as usize) / 2;

/// BUSY polling interval
const BUSY_POLL_MS: u32 = 10;
/// A full refresh takes ~30s; anything past this is a wedged panel
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Register writes that bring the controller up after reset
const INIT_SEQUENCE: &[(Register, &[u8])] = &[
    (Register::CommandHeader, &[0x49, 0x55, 0x20, 0x08, 0x09, 0x18]),
    (Register::PowerSetting, &[0x3F, 0x00, 0x32, 0x2A, 0x0E, 0x2A]),
    (Register::PanelSetting, &[0x5F, 0x69]),
    (Register::PowerOffSequence, &[0x00, 0x54, 0x00, 0x44]),
    (Register::BoosterSoftStart1, &[0x40, 0x1F, 0x1F, 0x2C]),
    (Register::BoosterSoftStart2, &[0x6F, 0x1F, 0x16, 0x25]),
    (Register::BoosterSoftStart3, &[0x6F, 0x1F, 0x1F, 0x22]),
    (Register::ImageProcess, &[0x00, 0x04]),
    (Register::PllControl, &[0x02]),
    (Register::TempSensorEnable, &[0x00]),
    (Register::VcomDataInterval, &[0x3F]),
    (Register::Tcon, &[0x02, 0x00]),
    // 800x480
    (Register::Resolution, &[0x03, 0x20, 0x01, 0xE0]),
    (Register::VcomDc, &[0x1E]),
    (Register::TempVcomDc, &[0x00]),
    (Register::Agid, &[0x00]),
    (Register::PowerSaving, &[0x2F]),
    (Register::Cascade, &[0x00]),
    (Register::TempSensorSetting, &[0x00]),
];

/// Driver for the 7.3" ACeP e-paper display
pub struct Epd7in3f<SPI, BUSY, DC, RST, DELAY> {
    spi: SPI,
    busy: BUSY,
    dc: DC,
    rst: RST,
    delay: DELAY,
}

impl<SPI, BUSY, DC, RST, DELAY> Epd7in3f<SPI, BUSY, DC, RST, DELAY>
where
    SPI: SpiDevice,
    BUSY: InputPin,
    DC: OutputPin,
    RST: OutputPin,
    DELAY: DelayNs,
{
    /// Wrap the bus and pins. The panel is not touched until `init`.
    pub fn new(spi: SPI, busy: BUSY, dc: DC, rst: RST, delay: DELAY) -> Self {
        Self {
            spi,
            busy,
            dc,
            rst,
            delay,
        }
    }

    /// Hardware reset sequence
    fn hardware_reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(gpio_error)?;
        self.delay.delay_ms(20);
        self.rst.set_low().map_err(gpio_error)?;
        self.delay.delay_ms(2);
        self.rst.set_high().map_err(gpio_error)?;
        self.delay.delay_ms(20);
        Ok(())
    }

    /// Wait for the display to become idle (BUSY pin high)
    fn wait_until_idle(&mut self) -> Result<(), DisplayError> {
        let mut waited_ms: u64 = 0;
        // BUSY is active low on this display
        while self.busy.is_low().map_err(gpio_error)? {
            if waited_ms >= BUSY_TIMEOUT.as_millis() as u64 {
                return Err(DisplayError::BusyTimeout(BUSY_TIMEOUT));
            }
            self.delay.delay_ms(BUSY_POLL_MS);
            waited_ms += u64::from(BUSY_POLL_MS);
        }
        Ok(())
    }

    /// Send a command to the display
    fn send_command(&mut self, reg: Register) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(gpio_error)?;
        self.spi.write(&[u8::from(reg)]).map_err(bus_error)
    }

    /// Send data to the display
    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(gpio_error)?;
        self.spi.write(data).map_err(bus_error)
    }

    /// Send command followed by data
    fn cmd_with_data(&mut self, reg: Register, data: &[u8]) -> Result<(), DisplayError> {
        self.send_command(reg)?;
        self.send_data(data)
    }

    /// Power on, refresh from the frame memory, power off
    fn refresh(&mut self) -> Result<(), DisplayError> {
        self.send_command(Register::PowerOn)?;
        self.wait_until_idle()?;

        self.cmd_with_data(Register::DisplayRefresh, &[0x00])?;
        self.wait_until_idle()?;

        self.cmd_with_data(Register::PowerOff, &[0x00])?;
        self.wait_until_idle()
    }

    /// Push a packed 4bpp frame and refresh
    pub fn show_buffer(&mut self, buffer: &[u8]) -> Result<(), DisplayError> {
        self.send_command(Register::DataStart)?;
        self.send_data(buffer)?;
        self.refresh()
    }
}

impl<SPI, BUSY, DC, RST, DELAY> DisplayDriver for Epd7in3f<SPI, BUSY, DC, RST, DELAY>
where
    SPI: SpiDevice + Send,
    BUSY: InputPin + Send,
    DC: OutputPin + Send,
    RST: OutputPin + Send,
    DELAY: DelayNs + Send,
{
    fn init(&mut self) -> Result<(), DisplayError> {
        self.hardware_reset()?;
        self.wait_until_idle()?;
        self.delay.delay_ms(30);

        for (reg, data) in INIT_SEQUENCE {
            self.cmd_with_data(*reg, data)?;
        }

        Ok(())
    }

    fn display(&mut self, image: &RgbImage, palette: &Palette) -> Result<(), DisplayError> {
        if image.dimensions() != (WIDTH, HEIGHT) {
            return Err(DisplayError::Size {
                expected: (WIDTH, HEIGHT),
                actual: image.dimensions(),
            });
        }

        let indexed = palette.dither(image);
        let buffer = palette.pack_4bpp(&indexed);
        debug_assert_eq!(buffer.len(), BUFFER_SIZE);

        self.show_buffer(&buffer)
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        self.cmd_with_data(Register::DeepSleep, &[0xA5])
    }
}

fn bus_error<E: embedded_hal::spi::Error>(e: E) -> DisplayError {
    DisplayError::Bus(format!("{:?}", e.kind()))
}

fn gpio_error<E: embedded_hal::digital::Error>(e: E) -> DisplayError {
    DisplayError::Gpio(format!("{:?}", e.kind()))
}
