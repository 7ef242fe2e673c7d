// Sample-rate and channel conversion for the capture path
//
// Devices deliver whatever rate and channel layout they natively run at; the live
// model only accepts 16kHz mono in fixed-size blocks.

use super::backend::AudioFrame;

/// Average interleaved channels down to a single mono channel
pub fn downmix_to_mono(frame: &AudioFrame) -> Vec<f32> {
    if frame.channels <= 1 {
        return frame.samples.clone();
    }

    let channels = frame.channels as usize;
    frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming linear-interpolation resampler for a mono signal
///
/// Keeps the last input sample and the fractional read position between calls so
/// consecutive blocks join without a discontinuity.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    step: f64,
    position: f64,
    carry: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate.max(1) as f64,
            position: 0.0,
            carry: None,
        }
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// A zero rate on either side yields no output
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.is_passthrough() {
            return input.to_vec();
        }
        if input.is_empty() || self.from_rate == 0 || self.to_rate == 0 {
            return Vec::new();
        }

        let mut buffer = Vec::with_capacity(input.len() + 1);
        if let Some(prev) = self.carry {
            buffer.push(prev);
        }
        buffer.extend_from_slice(input);

        let capacity = (input.len() as f64 / self.step).ceil() as usize + 1;
        let mut output = Vec::with_capacity(capacity);

        let last = buffer.len() - 1;
        while self.position < last as f64 {
            let index = self.position.floor() as usize;
            let frac = (self.position - index as f64) as f32;
            let a = buffer[index];
            let b = buffer[index + 1];
            output.push(a + (b - a) * frac);
            self.position += self.step;
        }

        // Rebase so the carried sample is index 0 of the next buffer
        self.position -= last as f64;
        self.carry = Some(buffer[last]);

        output
    }
}

/// Accumulates samples and yields fixed-size blocks
#[derive(Debug, Clone)]
pub struct BlockFramer {
    block_size: usize,
    pending: Vec<f32>,
}

impl BlockFramer {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size * 2),
        }
    }

    /// Append samples and drain every complete block
    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut blocks = Vec::new();
        while self.pending.len() >= self.block_size {
            let rest = self.pending.split_off(self.block_size);
            blocks.push(std::mem::replace(&mut self.pending, rest));
        }
        blocks
    }

    /// Samples waiting for the next block
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
