use std::time::Duration;

use serde::Serialize;

/// Running throughput figures for one batcher. Each batcher owns its own
/// copy, so independent batchers never see each other's numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub operations: u64,
    pub total_blocks: u64,
    pub total_time_ms: f64,
    pub current_chunk_size: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
}

impl PerformanceStats {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            current_chunk_size: chunk_size,
            success_rate: 1.0,
            ..Default::default()
        }
    }

    pub fn record_chunk(&mut self, blocks: u64, elapsed: Duration, success: bool, chunk_size: u64) {
        self.operations += 1;
        if success {
            self.successes += 1;
            self.total_blocks += blocks;
        } else {
            self.failures += 1;
        }
        self.total_time_ms += elapsed.as_secs_f64() * 1000.0;
        self.current_chunk_size = chunk_size;
        self.success_rate = self.successes as f64 / self.operations as f64;
    }

    pub fn blocks_per_second(&self) -> f64 {
        if self.total_time_ms <= 0.0 {
            0.0
        } else {
            self.total_blocks as f64 / (self.total_time_ms / 1000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_success_rate_and_throughput() {
        let mut stats = PerformanceStats::new(1024);
        stats.record_chunk(1000, Duration::from_millis(100), true, 2048);
        stats.record_chunk(500, Duration::from_millis(100), false, 1024);
        assert_eq!(stats.operations, 2);
        assert_eq!(stats.total_blocks, 1000);
        assert_eq!(stats.current_chunk_size, 1024);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.blocks_per_second() - 5000.0).abs() < 1e-6);
    }
}
