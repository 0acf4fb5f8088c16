//! Sample windows collected from the sensor FIFO.

/// Number of FIFO samples gathered per window.
pub const WINDOW_LEN: usize = 16;

/// Size in bytes of one window in its wire format.
pub const ENCODED_LEN: usize = WINDOW_LEN * 4;

/// One infrared/red sample pair as read from the FIFO.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    pub infrared: u16,
    pub red: u16,
}
impl Sample {
    /// Unpacks a 4-byte FIFO burst: infrared high, infrared low, red high, red low.
    pub fn from_fifo(bytes: [u8; 4]) -> Self {
        Self {
            infrared: ((bytes[0] as u16) << 8) | (bytes[1] as u16),
            red:      ((bytes[2] as u16) << 8) | (bytes[3] as u16),
        }
    }
}

/// A fixed-length run of [`WINDOW_LEN`] samples, kept as two parallel channel buffers.
///
/// Windows carry no history: every acquisition produces a fresh one.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SampleWindow {
    infrared: [u16; WINDOW_LEN],
    red: [u16; WINDOW_LEN],
}
impl SampleWindow {
    /// Builds a window from the two channel buffers.
    pub fn new(infrared: [u16; WINDOW_LEN], red: [u16; WINDOW_LEN]) -> Self {
        Self { infrared, red }
    }
    /// Gets the infrared channel in acquisition order.
    pub fn infrared(&self) -> &[u16; WINDOW_LEN] {
        &self.infrared
    }
    /// Gets the red channel in acquisition order.
    pub fn red(&self) -> &[u16; WINDOW_LEN] {
        &self.red
    }
    /// Gets the sample pair at `index`, or `None` past the end of the window.
    pub fn get(&self, index: usize) -> Option<Sample> {
        Some(Sample { infrared: *self.infrared.get(index)?, red: *self.red.get(index)? })
    }
    /// Iterates over the sample pairs in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.infrared.iter().zip(self.red.iter()).map(|(&infrared, &red)| Sample { infrared, red })
    }

    pub(crate) fn set(&mut self, index: usize, sample: Sample) {
        self.infrared[index] = sample.infrared;
        self.red[index] = sample.red;
    }

    /// Serializes the window as interleaved big-endian `(infrared, red)` pairs.
    ///
    /// This is the layout handed to consumers that run the estimation out of process.
    pub fn to_be_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        for (chunk, sample) in out.chunks_exact_mut(4).zip(self.iter()) {
            chunk[..2].copy_from_slice(&sample.infrared.to_be_bytes());
            chunk[2..].copy_from_slice(&sample.red.to_be_bytes());
        }
        out
    }
    /// Parses a window from its wire format. See [`SampleWindow::to_be_bytes`].
    pub fn from_be_bytes(bytes: &[u8; ENCODED_LEN]) -> Self {
        let mut window = Self::default();
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            window.set(i, Sample::from_fifo([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        window
    }
}
