//! A MAX30100 sitting behind a simulated two-wire controller.

use std::cell::RefCell;
use std::rc::Rc;

use max30100::bus::{Flag, Peripheral, StatusRegister, Timing};

/// What happened on the wire, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    Start,
    Stop,
    Address(u8),
    Byte(u8),
    Recv { value: u8, ack: bool },
    Status(StatusRegister),
}

#[derive(Default)]
pub struct State {
    pub present: bool,
    /// INT_STATUS reads that come back not ready before power ready shows up; `None` for never.
    pub ready_after: Option<usize>,
    pub status_reads: usize,
    pub fifo: Vec<u8>,
    fifo_pos: usize,
    pub regs: [u8; 16],
    pub writes: Vec<(u8, u8)>,
    pub stuck: Option<Flag>,
    /// Acknowledge the address but refuse every data byte.
    pub nack_data: bool,
    pub wire: Vec<Wire>,
    pub timing: Option<Timing>,
    await_address: bool,
    await_pointer: bool,
    pointer: u8,
    ack: bool,
    nack: bool,
}

/// Cloning shares the state, so tests keep a handle after the driver takes the bus.
#[derive(Clone)]
pub struct SimSensor(pub Rc<RefCell<State>>);
impl SimSensor {
    pub fn new(fifo: &[u8]) -> Self {
        Self(Rc::new(RefCell::new(State {
            present: true,
            ready_after: Some(0),
            fifo: fifo.to_vec(),
            ..Default::default()
        })))
    }
    pub fn state(&self) -> std::cell::RefMut<'_, State> {
        self.0.borrow_mut()
    }
}

impl Peripheral for SimSensor {
    fn configure(&mut self, timing: Timing) {
        self.state().timing = Some(timing);
    }
    fn generate_start(&mut self) {
        let mut s = self.state();
        s.await_address = true;
        s.wire.push(Wire::Start);
    }
    fn generate_stop(&mut self) {
        self.state().wire.push(Wire::Stop);
    }
    fn write_data(&mut self, byte: u8) {
        let mut guard = self.state();
        let s = &mut *guard;
        if s.await_address {
            s.wire.push(Wire::Address(byte));
            s.await_address = false;
            s.nack = !s.present || byte >> 1 != 0x57;
            s.await_pointer = byte & 1 == 0;
        } else {
            s.wire.push(Wire::Byte(byte));
            if s.nack_data {
                s.nack = true;
            } else if s.await_pointer {
                s.pointer = byte;
                s.await_pointer = false;
            } else {
                let reg = s.pointer;
                s.regs[reg as usize & 0x0f] = byte;
                s.writes.push((reg, byte));
            }
        }
    }
    fn read_data(&mut self) -> u8 {
        let mut guard = self.state();
        let s = &mut *guard;
        let value = match s.pointer {
            0x00 => {
                s.status_reads += 1;
                let ready = s.ready_after.map_or(false, |n| s.status_reads > n);
                if ready { 0x01 } else { 0x00 }
            }
            0x05 if !s.fifo.is_empty() => {
                let value = s.fifo[s.fifo_pos % s.fifo.len()];
                s.fifo_pos += 1;
                value
            }
            reg => s.regs[reg as usize & 0x0f],
        };
        let ack = s.ack;
        s.wire.push(Wire::Recv { value, ack });
        value
    }
    fn set_acknowledge(&mut self, enable: bool) {
        self.state().ack = enable;
    }
    fn flag(&mut self, flag: Flag) -> bool {
        let s = self.state();
        if s.stuck == Some(flag) {
            return flag == Flag::Busy;
        }
        match flag {
            Flag::AddressSent => !s.nack,
            Flag::AcknowledgeFailure => s.nack,
            Flag::ByteTransferFinished => !s.nack,
            Flag::Busy => false,
            _ => true,
        }
    }
    fn clear_flag(&mut self, flag: Flag) {
        if flag == Flag::AcknowledgeFailure {
            self.state().nack = false;
        }
    }
    fn read_status(&mut self, register: StatusRegister) -> u16 {
        self.state().wire.push(Wire::Status(register));
        0
    }
}
