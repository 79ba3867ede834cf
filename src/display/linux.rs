//! Waveshare HAT wiring on a Raspberry Pi: spidev for the bus, sysfs GPIO
//! for the control lines.

use super::epd::Epd7in3f;
use super::DisplayError;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::Direction;
use linux_embedded_hal::{Delay, SpidevDevice, SysfsPin};

const SPI_PATH: &str = "/dev/spidev0.0";
const SPI_SPEED_HZ: u32 = 4_000_000;

/// BCM pin numbers used by the HAT
const RST_PIN: u64 = 17;
const DC_PIN: u64 = 25;
const BUSY_PIN: u64 = 24;

pub type WaveshareEpd = Epd7in3f<SpidevDevice, SysfsPin, SysfsPin, SysfsPin, Delay>;

/// Open the bus and claim the control lines
pub fn open_waveshare() -> Result<WaveshareEpd, DisplayError> {
    let mut spi = SpidevDevice::open(SPI_PATH).map_err(|e| DisplayError::Bus(e.to_string()))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_SPEED_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.0
        .configure(&options)
        .map_err(|e| DisplayError::Bus(e.to_string()))?;

    let rst = export_pin(RST_PIN, Direction::Out)?;
    let dc = export_pin(DC_PIN, Direction::Out)?;
    let busy = export_pin(BUSY_PIN, Direction::In)?;

    tracing::info!("Opened e-paper panel on {}", SPI_PATH);
    Ok(Epd7in3f::new(spi, busy, dc, rst, Delay))
}

fn export_pin(number: u64, direction: Direction) -> Result<SysfsPin, DisplayError> {
    let pin = SysfsPin::new(number);
    pin.export()
        .and_then(|_| pin.set_direction(direction))
        .map_err(|e| DisplayError::Gpio(format!("pin {}: {}", number, e)))?;
    Ok(pin)
}
