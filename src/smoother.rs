// src/smoother.rs

use std::collections::VecDeque;

/// What the arbiter sees each tick: the windowed mean plus how long the
/// raw score has stayed on one side of the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedSignal {
    pub mean: f32,
    pub high_streak: u32,
    pub low_streak: u32,
}

/// Temporal smoother over the anomaly score using a bounded sliding window,
/// so a single noisy reconstruction never flips the control mode.
pub struct ScoreSmoother {
    history: VecDeque<f32>,
    capacity: usize,
    threshold: f32,
    high_streak: u32,
    low_streak: u32,
}

impl ScoreSmoother {
    pub fn new(capacity: usize, threshold: f32) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
            high_streak: 0,
            low_streak: 0,
        }
    }

    /// Push this tick's score, evicting the oldest entry at capacity, and
    /// return the updated signal. Incrementing one streak resets the other.
    pub fn push(&mut self, score: f32) -> SmoothedSignal {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(score);

        if score > self.threshold {
            self.high_streak += 1;
            self.low_streak = 0;
        } else {
            self.low_streak += 1;
            self.high_streak = 0;
        }

        self.signal()
    }

    /// The current signal without pushing; what a skipped tick reuses.
    pub fn signal(&self) -> SmoothedSignal {
        let mean = if self.history.is_empty() {
            0.0
        } else {
            self.history.iter().sum::<f32>() / self.history.len() as f32
        };
        SmoothedSignal {
            mean,
            high_streak: self.high_streak,
            low_streak: self.low_streak,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.high_streak = 0;
        self.low_streak = 0;
    }
}
