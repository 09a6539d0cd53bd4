use agenttrace_core::domain::TraceId;
use sha2::{Digest, Sha256};

/// Head-based sampler: a trace_id hashes to a uniform `[0,1)` value, compared
/// against `sample_rate`. All spans of a trace share the same decision
/// (spec.md §4.2 "Sampling") because the decision depends only on `trace_id`.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    sample_rate: f64,
}

impl Sampler {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: sample_rate.clamp(0.0, 1.0),
        }
    }

    pub fn should_sample(&self, trace_id: TraceId) -> bool {
        if self.sample_rate >= 1.0 {
            return true;
        }
        if self.sample_rate <= 0.0 {
            return false;
        }
        let digest = Sha256::digest(trace_id.as_uuid().as_bytes());
        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&digest[..8]);
        let as_u64 = u64::from_be_bytes(bucket);
        let fraction = as_u64 as f64 / u64::MAX as f64;
        fraction < self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_trace_id_always_agrees() {
        let sampler = Sampler::new(0.5);
        let trace_id = TraceId::new();
        let first = sampler.should_sample(trace_id);
        for _ in 0..20 {
            assert_eq!(sampler.should_sample(trace_id), first);
        }
    }

    #[test]
    fn rate_zero_never_samples_rate_one_always_samples() {
        let trace_id = TraceId::new();
        assert!(!Sampler::new(0.0).should_sample(trace_id));
        assert!(Sampler::new(1.0).should_sample(trace_id));
    }
}
