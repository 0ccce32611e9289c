//! Synthetic signal streams
//!
//! Topics are orthogonal basis directions; signals are a topic direction
//! plus bounded uniform noise, so same-topic similarity stays high and
//! cross-topic similarity stays near zero.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trendline::{EmbeddedSignal, Signal};

/// Reference "now" shared by the integration tests
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Signal aged `days_ago` relative to [`fixed_now`]
pub fn signal_at(id: &str, text: &str, days_ago: i64, source: &str) -> Signal {
    Signal::new(id, text, fixed_now() - Duration::days(days_ago), source)
}

/// Seeded generator of embedded signals drawn from a fixed set of topics
pub struct TopicStream {
    rng: StdRng,
    dimension: usize,
    topics: usize,
    noise: f32,
    next_id: usize,
    /// Topic of every emitted signal, by emission order
    pub labels: Vec<usize>,
}

impl TopicStream {
    pub fn new(seed: u64, topics: usize, dimension: usize, noise: f32) -> Self {
        assert!(topics <= dimension, "topics must fit in distinct axes");
        Self {
            rng: StdRng::seed_from_u64(seed),
            dimension,
            topics,
            noise,
            next_id: 0,
            labels: Vec::new(),
        }
    }

    /// One signal from a randomly chosen topic
    pub fn next_signal(&mut self) -> EmbeddedSignal {
        let topic = self.rng.gen_range(0..self.topics);
        self.signal_for(topic)
    }

    pub fn signal_for(&mut self, topic: usize) -> EmbeddedSignal {
        let mut embedding: Vec<f32> = (0..self.dimension)
            .map(|_| self.rng.gen_range(-self.noise..=self.noise))
            .collect();
        embedding[topic] += 1.0;

        let id = format!("sig-{:05}", self.next_id);
        self.next_id += 1;
        self.labels.push(topic);

        let days_ago = self.rng.gen_range(0..90);
        let source = format!("feed-{}", self.rng.gen_range(0..4));
        let signal = signal_at(&id, &format!("topic {topic} item {id}"), days_ago, &source);
        EmbeddedSignal::new(signal, embedding)
    }

    pub fn batch(&mut self, size: usize) -> Vec<EmbeddedSignal> {
        (0..size).map(|_| self.next_signal()).collect()
    }

    /// Arbitrary vectors with no topic structure
    pub fn unstructured(&mut self, size: usize) -> Vec<EmbeddedSignal> {
        (0..size)
            .map(|_| {
                let embedding: Vec<f32> = (0..self.dimension)
                    .map(|_| self.rng.gen_range(-1.0f32..=1.0))
                    .collect();
                let id = format!("raw-{:05}", self.next_id);
                self.next_id += 1;
                EmbeddedSignal::new(signal_at(&id, "unstructured", 1, "feed-0"), embedding)
            })
            .collect()
    }

    /// A seeded draw in `[lo, hi)` for test parameters
    pub fn draw(&mut self, lo: f32, hi: f32) -> f32 {
        self.rng.gen_range(lo..hi)
    }
}
