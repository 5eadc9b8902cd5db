//! Threshold Filter Module
//!
//! Keeps alignment hits whose percent identity and percent length overlap
//! both reach the run thresholds. Both bounds are inclusive.

use crate::alignment::AlignmentHit;
use crate::error::ConfigurationError;

/// An alignment hit tagged with its threshold outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredHit {
    pub hit: AlignmentHit,
    pub passed: bool,
}

impl FilteredHit {
    pub fn into_hit(self) -> AlignmentHit {
        self.hit
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdFilter {
    pid_threshold: f64,
    plength_threshold: f64,
}

impl ThresholdFilter {
    /// Both thresholds must lie in [0, 100].
    pub fn new(pid_threshold: f64, plength_threshold: f64) -> Result<Self, ConfigurationError> {
        for (name, value) in [("pid threshold", pid_threshold), ("percent length overlap", plength_threshold)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigurationError::InvalidThreshold { name, value });
            }
        }
        Ok(Self {
            pid_threshold,
            plength_threshold,
        })
    }

    pub fn passes(&self, hit: &AlignmentHit) -> bool {
        hit.pident >= self.pid_threshold && hit.plength >= self.plength_threshold
    }

    /// Tags every hit with its outcome, preserving input order.
    pub fn evaluate<I>(&self, hits: I) -> Vec<FilteredHit>
    where
        I: IntoIterator<Item = AlignmentHit>,
    {
        hits.into_iter()
            .map(|hit| FilteredHit { passed: self.passes(&hit), hit })
            .collect()
    }

    /// Returns the passing hits only, preserving input order.
    pub fn filter<I>(&self, hits: I) -> Vec<FilteredHit>
    where
        I: IntoIterator<Item = AlignmentHit>,
    {
        hits.into_iter()
            .filter(|hit| self.passes(hit))
            .map(|hit| FilteredHit { hit, passed: true })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(query: &str, pident: f64, plength: f64) -> AlignmentHit {
        AlignmentHit {
            query_id: query.to_string(),
            query_len: 1000,
            reference_id: "blaTEM-1_1_AY458016".to_string(),
            reference_len: 861,
            pident,
            plength,
            query_start: 0,
            query_end: 861,
            reference_start: 0,
            reference_end: 861,
            strand: '+',
            score: 800,
            alignment: None,
        }
    }

    #[test]
    fn test_inclusive_boundaries() {
        let filter = ThresholdFilter::new(98.0, 60.0).unwrap();
        assert!(filter.passes(&hit("a", 98.0, 60.0)));
        assert!(filter.passes(&hit("b", 99.5, 80.0)));
        assert!(!filter.passes(&hit("c", 97.99, 100.0)));
        assert!(!filter.passes(&hit("d", 100.0, 59.99)));
    }

    #[test]
    fn test_filter_subset_in_order() {
        let filter = ThresholdFilter::new(98.0, 60.0).unwrap();
        let hits = vec![
            hit("c1", 99.0, 100.0),
            hit("c2", 90.0, 100.0),
            hit("c3", 100.0, 61.0),
            hit("c4", 100.0, 10.0),
            hit("c5", 98.0, 60.0),
        ];

        let passed = filter.filter(hits.clone());
        let ids: Vec<&str> = passed.iter().map(|f| f.hit.query_id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3", "c5"]);
        assert!(passed.iter().all(|f| f.passed && f.hit.pident >= 98.0 && f.hit.plength >= 60.0));

        let evaluated = filter.evaluate(hits);
        assert_eq!(evaluated.len(), 5);
        assert_eq!(
            evaluated.iter().map(|f| f.passed).collect::<Vec<_>>(),
            vec![true, false, true, false, true]
        );
    }

    #[test]
    fn test_filter_idempotent() {
        let filter = ThresholdFilter::new(95.0, 50.0).unwrap();
        let hits: Vec<AlignmentHit> = (0..40)
            .map(|i| hit(&format!("c{}", i), 90.0 + (i % 11) as f64, 30.0 + (i * 7 % 70) as f64))
            .collect();

        let once = filter.filter(hits);
        let twice = filter.filter(once.iter().cloned().map(FilteredHit::into_hit));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(ThresholdFilter::new(-1.0, 60.0).is_err());
        assert!(ThresholdFilter::new(98.0, 100.1).is_err());
        assert!(ThresholdFilter::new(0.0, 100.0).is_ok());
    }
}
