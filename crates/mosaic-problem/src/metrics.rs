//! Per-evaluation timing and counts.

/// Counters for the most recent evaluation.
///
/// Reported by [`Problem::last_metrics`](crate::Problem::last_metrics).
/// Timing fields are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalMetrics {
    /// Wall-clock time of the whole evaluation.
    pub total_us: u64,
    /// Time spent in the element loop (all workers, wall clock).
    pub element_loop_us: u64,
    /// Time spent reducing worker output and applying nodal BCs.
    pub reduce_us: u64,
    /// Elements visited.
    pub elements: u64,
    /// Boundary sides visited.
    pub sides: u64,
    /// Quadrature-point contributor evaluations.
    pub qp_evaluations: u64,
    /// Workers that took part.
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_zero() {
        let m = EvalMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.element_loop_us, 0);
        assert_eq!(m.reduce_us, 0);
        assert_eq!(m.elements, 0);
        assert_eq!(m.sides, 0);
        assert_eq!(m.qp_evaluations, 0);
        assert_eq!(m.workers, 0);
    }
}
