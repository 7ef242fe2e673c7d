// Output timeline: mixes scheduled playback units into a device buffer
//
// The device clock is the number of frames rendered so far. Units are placed at
// `start_at` on that clock, resampled to the device rate and downmixed to mono.
// A unit whose last sample has been rendered is complete.

use super::playback::{PlaybackCompletion, PlaybackUnit, UnitId};
use super::resample::LinearResampler;

struct Voice {
    id: UnitId,
    start_frame: u64,
    samples: Vec<f32>,
    on_ended: PlaybackCompletion,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mono playout clock and mixer for one output device
pub struct OutputTimeline {
    sample_rate: u32,
    position: u64,
    voices: Vec<Voice>,
}

impl OutputTimeline {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            position: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio rendered so far
    pub fn current_time(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    /// Place `unit` on the timeline
    ///
    /// A unit starting in the past plays from the current position; the part that
    /// is already due is skipped.
    pub fn add(&mut self, unit: &PlaybackUnit, on_ended: PlaybackCompletion) {
        let mono = mixdown(&unit.planes);
        let samples = if unit.sample_rate == self.sample_rate {
            mono
        } else {
            LinearResampler::new(unit.sample_rate, self.sample_rate).process(&mono)
        };

        let start_frame = (unit.start_at.max(0.0) * self.sample_rate as f64).round() as u64;

        self.voices.push(Voice {
            id: unit.id,
            start_frame,
            samples,
            on_ended,
        });
    }

    /// Drop a unit without completing it. Returns false if it was not scheduled
    pub fn remove(&mut self, id: UnitId) -> bool {
        let before = self.voices.len();
        self.voices.retain(|voice| voice.id != id);
        self.voices.len() != before
    }

    /// Units not yet fully rendered
    pub fn pending(&self) -> usize {
        self.voices.len()
    }

    /// Fill `out` with the next mono samples and advance the clock
    ///
    /// Returns the completions of every unit that finished within this buffer.
    /// Callers fire them after releasing whatever lock guards the timeline.
    pub fn render(&mut self, out: &mut [f32]) -> Vec<PlaybackCompletion> {
        out.fill(0.0);

        let start = self.position;
        let end = start + out.len() as u64;

        for voice in &self.voices {
            let from = voice.start_frame.max(start);
            let to = voice.end_frame().min(end);
            for frame in from..to {
                out[(frame - start) as usize] += voice.samples[(frame - voice.start_frame) as usize];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.position = end;

        let mut finished = Vec::new();
        let mut index = 0;
        while index < self.voices.len() {
            if self.voices[index].end_frame() <= end {
                finished.push(self.voices.swap_remove(index).on_ended);
            } else {
                index += 1;
            }
        }
        finished
    }
}

fn mixdown(planes: &[Vec<f32>]) -> Vec<f32> {
    match planes {
        [] => Vec::new(),
        [mono] => mono.clone(),
        _ => {
            let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
            let scale = planes.len() as f32;
            (0..frames)
                .map(|i| planes.iter().map(|plane| plane[i]).sum::<f32>() / scale)
                .collect()
        }
    }
}
