//! A polled I2C master built from start, address, data and stop primitives.
//!
//! [`BusEngine`] drives any [`Peripheral`] exposing the usual flag set of a two-wire
//! controller and implements [`embedded_hal::i2c::I2c`] on top of it, so the sensor driver
//! can run either on this engine or on any other I2C implementation.
//! Every wait on a flag is bounded, and gives up with [`BusError::Timeout`] once its budget is spent.

use core::fmt;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};

/// Default wait budget per flag, in microseconds.
pub const DEFAULT_TIMEOUT_US: u32 = 10_000;

/// Standard mode bus clock.
pub const BUS_FREQUENCY_HZ: u32 = 100_000;

/// Status conditions reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flag {
    /// A start condition was generated.
    StartBit,
    /// The slave acknowledged its address.
    AddressSent,
    /// The data register can take another byte.
    TxEmpty,
    /// The last byte left the shift register.
    ByteTransferFinished,
    /// A received byte is waiting in the data register.
    RxNotEmpty,
    /// Communication is ongoing on the bus.
    Busy,
    /// The slave did not acknowledge.
    AcknowledgeFailure,
}

/// The two status registers of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusRegister {
    Sr1,
    Sr2,
}

/// Clock setup of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timing {
    /// Peripheral clock frequency in MHz.
    pub freq_mhz: u8,
    /// Clock control divider.
    pub ccr: u16,
    /// Maximum rise time, in peripheral clock cycles plus one.
    pub trise: u8,
}
impl Timing {
    /// Computes standard mode (100 kHz) timing for the given peripheral clock.
    pub const fn standard_mode(pclk_mhz: u8) -> Self {
        let ccr = (pclk_mhz as u32 * 1_000_000 / (2 * BUS_FREQUENCY_HZ)) as u16;
        Self { freq_mhz: pclk_mhz, ccr, trise: pclk_mhz.saturating_add(1) }
    }
}

/// Register level access to a two-wire bus controller.
///
/// Implementations wrap the hardware (or a simulation of it); the engine only ever talks to
/// the controller through these operations.
pub trait Peripheral {
    /// Applies clock timing and enables the controller.
    fn configure(&mut self, timing: Timing);
    fn generate_start(&mut self);
    fn generate_stop(&mut self);
    /// Writes the data register.
    fn write_data(&mut self, byte: u8);
    /// Reads the data register.
    fn read_data(&mut self) -> u8;
    /// Sets whether the next received byte is acknowledged.
    fn set_acknowledge(&mut self, enable: bool);
    fn flag(&mut self, flag: Flag) -> bool;
    fn clear_flag(&mut self, flag: Flag);
    /// Reads a status register. Some flags are cleared as a side effect of these reads.
    fn read_status(&mut self, register: StatusRegister) -> u16;
}

/// Failures of a bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusError {
    /// The given flag never reached its expected state.
    Timeout(Flag),
    /// The slave did not acknowledge.
    NoAcknowledge(NoAcknowledgeSource),
}
impl i2c::Error for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Timeout(_) => ErrorKind::Other,
            BusError::NoAcknowledge(source) => ErrorKind::NoAcknowledge(*source),
        }
    }
}
impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::Timeout(flag) => write!(f, "bus timeout waiting for {flag:?}"),
            BusError::NoAcknowledge(source) => write!(f, "no acknowledge from {source:?}"),
        }
    }
}

/// A polled I2C master over a [`Peripheral`].
pub struct BusEngine<P, D> {
    peripheral: P,
    delay: D,
    timeout_us: u32,
}
impl<P: Peripheral, D: DelayNs> BusEngine<P, D> {
    /// Configures the controller and wraps it with the default wait budget.
    pub fn new(peripheral: P, delay: D, timing: Timing) -> Self {
        Self::with_timeout(peripheral, delay, timing, DEFAULT_TIMEOUT_US)
    }
    /// Configures the controller and wraps it, waiting at most `timeout_us` on any single flag.
    pub fn with_timeout(mut peripheral: P, delay: D, timing: Timing, timeout_us: u32) -> Self {
        peripheral.configure(timing);
        peripheral.set_acknowledge(true);
        Self { peripheral, delay, timeout_us }
    }
    /// Gives back the peripheral and delay.
    pub fn release(self) -> (P, D) {
        (self.peripheral, self.delay)
    }

    fn wait(&mut self, flag: Flag, state: bool, nack: Option<NoAcknowledgeSource>) -> Result<(), BusError> {
        let mut waited = 0;
        loop {
            if self.peripheral.flag(flag) == state {
                return Ok(());
            }
            if let Some(source) = nack {
                if self.peripheral.flag(Flag::AcknowledgeFailure) {
                    self.peripheral.clear_flag(Flag::AcknowledgeFailure);
                    return Err(BusError::NoAcknowledge(source));
                }
            }
            if waited >= self.timeout_us {
                return Err(BusError::Timeout(flag));
            }
            self.delay.delay_us(1);
            waited += 1;
        }
    }

    /// Generates a start condition.
    pub fn start(&mut self) -> Result<(), BusError> {
        self.peripheral.generate_start();
        self.wait(Flag::StartBit, true, None)
    }
    /// Generates a start condition while the bus is still held.
    pub fn repeated_start(&mut self) -> Result<(), BusError> {
        self.start()
    }
    /// Generates a stop condition and waits for the bus to go idle.
    pub fn stop(&mut self) -> Result<(), BusError> {
        self.peripheral.generate_stop();
        self.wait(Flag::Busy, false, None)
    }
    /// Sends an address byte (7-bit address plus direction bit).
    pub fn send_address(&mut self, addr: u8) -> Result<(), BusError> {
        self.peripheral.write_data(addr);
        self.wait(Flag::AddressSent, true, Some(NoAcknowledgeSource::Address))?;
        // ADDR only clears on SR1 followed by SR2
        self.peripheral.read_status(StatusRegister::Sr1);
        self.peripheral.read_status(StatusRegister::Sr2);
        Ok(())
    }
    /// Sends one data byte, returning once it has fully left the shift register.
    pub fn send_byte(&mut self, data: u8) -> Result<(), BusError> {
        self.wait(Flag::TxEmpty, true, Some(NoAcknowledgeSource::Data))?;
        self.peripheral.write_data(data);
        self.wait(Flag::ByteTransferFinished, true, Some(NoAcknowledgeSource::Data))
    }
    /// Receives one data byte.
    ///
    /// `ack_next` is latched before waiting, so the final byte of a read must be requested
    /// with `false` to have the controller answer it with NACK.
    pub fn recv_byte(&mut self, ack_next: bool) -> Result<u8, BusError> {
        self.peripheral.set_acknowledge(ack_next);
        self.wait(Flag::RxNotEmpty, true, None)?;
        Ok(self.peripheral.read_data())
    }

    fn run(&mut self, address: SevenBitAddress, operations: &mut [Operation<'_>]) -> Result<(), BusError> {
        // direction of the previous operation, Some(true) for reads
        let mut previous = None;
        for i in 0..operations.len() {
            let next_is_read = matches!(operations.get(i + 1), Some(Operation::Read(_)));
            match &mut operations[i] {
                Operation::Write(bytes) => {
                    if previous != Some(false) {
                        self.begin(previous.is_some())?;
                        self.send_address(address << 1)?;
                    }
                    for &byte in bytes.iter() {
                        self.send_byte(byte)?;
                    }
                    previous = Some(false);
                }
                Operation::Read(buf) => {
                    if previous != Some(true) {
                        self.begin(previous.is_some())?;
                        self.send_address((address << 1) | 1)?;
                    }
                    let last_run = !next_is_read;
                    let len = buf.len();
                    for (j, byte) in buf.iter_mut().enumerate() {
                        *byte = self.recv_byte(!(last_run && j + 1 == len))?;
                    }
                    previous = Some(true);
                }
            }
        }
        match previous {
            Some(_) => self.stop(),
            None => Ok(()),
        }
    }

    fn begin(&mut self, repeated: bool) -> Result<(), BusError> {
        if repeated { self.repeated_start() } else { self.start() }
    }
}

impl<P, D> ErrorType for BusEngine<P, D> {
    type Error = BusError;
}
impl<P: Peripheral, D: DelayNs> I2c for BusEngine<P, D> {
    fn transaction(&mut self, address: SevenBitAddress, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let res = self.run(address, operations);
        if let Err(e) = res {
            match e {
                BusError::NoAcknowledge(NoAcknowledgeSource::Address) => {
                    log::debug!("no device acknowledged {:#04x}", address)
                }
                _ => log::warn!("i2c transaction with {:#04x} failed: {}", address, e),
            }
            // best-effort release of the bus, keeping the first error
            let _ = self.stop();
        }
        res
    }
}
