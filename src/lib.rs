#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

#![doc = include_str!("../README.md")]

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource};

pub mod bus;
pub mod spo2;
pub mod window;

pub use spo2::{Policy, Spo2};
pub use window::{Sample, SampleWindow};

use window::{ENCODED_LEN, WINDOW_LEN};

/// The 7-bit bus address of the sensor (0xAE for writes, 0xAF for reads).
pub const ADDRESS: u8 = 0x57;

/// The registers used by this driver.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    IntStatus  = 0x00,
    FifoData   = 0x05,
    ModeConfig = 0x06,
    Spo2Config = 0x07,
    LedConfig  = 0x09,
}

/// Power ready bit of [`Register::IntStatus`].
pub const POWER_READY: u8 = 0x01;
/// SpO2-only operating mode.
pub const MODE_SPO2: u8 = 0x03;
/// 100 Hz sample rate with 1600 us LED pulses.
pub const SPO2_100HZ_1600US: u8 = 0x5C;
/// Red (high nibble) and infrared (low nibble) LED current settings.
pub const LED_CURRENTS: u8 = 0x59;

/// How many times [`Register::IntStatus`] is polled for power ready.
pub const READY_ATTEMPTS: u32 = 10;
/// Pause between power ready polls.
pub const READY_POLL_MS: u32 = 100;
/// Settling time after power ready and after each configuration write.
pub const SETTLE_MS: u32 = 10;

// order matters: mode, then sample timing, then LED current
const BRING_UP: [(Register, u8); 3] = [
    (Register::ModeConfig, MODE_SPO2),
    (Register::Spo2Config, SPO2_100HZ_1600US),
    (Register::LedConfig,  LED_CURRENTS),
];

/// Errors reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// Bus failure, including timeouts of the underlying bus.
    Bus(E),
    /// No device acknowledged the sensor address.
    Absent,
    /// The power ready bit never came up.
    NotReady,
}
impl<E: i2c::Error> From<E> for Error<E> {
    fn from(e: E) -> Self {
        match e.kind() {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => Error::Absent,
            _ => Error::Bus(e),
        }
    }
}
impl<E: fmt::Debug> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {e:?}"),
            Error::Absent => f.write_str("MAX30100 not present on the bus"),
            Error::NotReady => f.write_str("MAX30100 did not report power ready"),
        }
    }
}

/// A MAX30100 sensor wrapper.
///
/// A value of this type only exists for a device that came up and took its configuration,
/// see [`Max30100::new`].
pub struct Max30100<I: I2c, D: DelayNs> {
    i2c: I,
    delay: D,
}

/// Checks whether anything acknowledges the sensor address.
///
/// Note that a found device is not necessarily a MAX30100 sensor,
/// as it could be that some other device has the same address.
pub fn probe<I: I2c>(i2c: &mut I) -> bool {
    i2c.write(ADDRESS, &[]).is_ok()
}

impl<I: I2c, D: DelayNs> Max30100<I, D> {
    /// Constructs a MAX30100 sensor wrapper and brings the device up.
    ///
    /// [`Register::IntStatus`] is polled up to [`READY_ATTEMPTS`] times, [`READY_POLL_MS`] apart,
    /// until power ready is set. The device is then put in SpO2 mode at 100 Hz with fixed LED
    /// currents, waiting [`SETTLE_MS`] after each step.
    /// A failure part way through leaves the device partially configured.
    pub fn new(i2c: I, delay: D) -> Result<Self, Error<I::Error>> {
        let mut dev = Self { i2c, delay };
        dev.initialize()?;
        Ok(dev)
    }
    /// Gives back the bus and delay.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }

    /// Reads a single register.
    pub fn read_register(&mut self, reg: Register) -> Result<u8, Error<I::Error>> {
        let mut res = [0u8];
        self.i2c.write_read(ADDRESS, &[reg as u8], &mut res)?;
        Ok(res[0])
    }
    /// Writes a single register.
    pub fn write_register(&mut self, reg: Register, value: u8) -> Result<(), Error<I::Error>> {
        self.i2c.write(ADDRESS, &[reg as u8, value])?;
        Ok(())
    }

    fn wait_power_ready(&mut self) -> Result<(), Error<I::Error>> {
        for attempt in 1..=READY_ATTEMPTS {
            let status = self.read_register(Register::IntStatus)?;
            log::debug!("INT_STATUS = {:#04x} (attempt {})", status, attempt);
            if status & POWER_READY != 0 {
                return Ok(());
            }
            if attempt < READY_ATTEMPTS {
                self.delay.delay_ms(READY_POLL_MS);
            }
        }
        log::warn!("MAX30100: power ready not set after {} attempts", READY_ATTEMPTS);
        Err(Error::NotReady)
    }

    fn initialize(&mut self) -> Result<(), Error<I::Error>> {
        self.wait_power_ready()?;
        log::info!("MAX30100: chip ready, initializing");
        self.delay.delay_ms(SETTLE_MS);

        for (step, (reg, value)) in BRING_UP.iter().copied().enumerate() {
            self.write_register(reg, value)?;
            self.delay.delay_ms(SETTLE_MS);
            log::debug!("step {}: {:?} = {:#04x}", step + 1, reg, value);
        }
        log::info!("MAX30100: initialization done");
        Ok(())
    }

    fn read_sample(&mut self) -> Result<Sample, Error<I::Error>> {
        let mut res = [0u8; 4];
        self.i2c.write_read(ADDRESS, &[Register::FifoData as u8], &mut res)?;
        Ok(Sample::from_fifo(res))
    }

    /// Collects a fresh window of samples, one 4-byte FIFO burst per sample.
    ///
    /// A bus failure part way through discards the whole window.
    pub fn read_window(&mut self) -> Result<SampleWindow, Error<I::Error>> {
        let mut window = SampleWindow::default();
        for i in 0..WINDOW_LEN {
            let sample = self.read_sample()?;
            window.set(i, sample);
        }
        log::trace!("collected {} samples from FIFO", WINDOW_LEN);
        Ok(window)
    }
    /// Fills `buf` with as many whole windows as fit, in the format of [`SampleWindow::to_be_bytes`].
    /// Returns the number of bytes written; a buffer shorter than one window gets nothing.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error<I::Error>> {
        let mut written = 0;
        for chunk in buf.chunks_exact_mut(ENCODED_LEN) {
            chunk.copy_from_slice(&self.read_window()?.to_be_bytes());
            written += ENCODED_LEN;
        }
        Ok(written)
    }
    /// Collects one window and estimates SpO2 from it.
    pub fn measure(&mut self, policy: Policy) -> Result<Spo2, Error<I::Error>> {
        let window = self.read_window()?;
        Ok(spo2::estimate(&window, policy))
    }
}
