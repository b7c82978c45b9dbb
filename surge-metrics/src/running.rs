/// Online mean/variance (Welford) with exact min/max.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n = self.n.saturating_add(1);
        let n_f = self.n as f64;

        let delta = x - self.mean;
        self.mean += delta / n_f;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;

        if self.n == 1 || x < self.min {
            self.min = x;
        }
        if self.n == 1 || x > self.max {
            self.max = x;
        }
    }

    /// Combines two partial aggregates (Chan et al. parallel update).
    pub fn merge(&mut self, other: &Self) {
        if other.n == 0 {
            return;
        }
        if self.n == 0 {
            *self = *other;
            return;
        }

        let n_a = self.n as f64;
        let n_b = other.n as f64;
        let n = n_a + n_b;
        let delta = other.mean - self.mean;

        self.mean += delta * n_b / n;
        self.m2 += other.m2 + delta * delta * n_a * n_b / n;
        self.n = self.n.saturating_add(other.n);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> Option<f64> {
        (self.n > 0).then_some(self.mean)
    }

    /// Population standard deviation, matching what load-test reports usually print.
    pub fn stdev(&self) -> Option<f64> {
        (self.n > 0).then(|| (self.m2 / self.n as f64).sqrt())
    }

    pub fn min(&self) -> Option<f64> {
        (self.n > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_has_no_stats() {
        let s = RunningStats::default();
        assert_eq!(s.count(), 0);
        assert!(s.mean().is_none());
        assert!(s.stdev().is_none());
        assert!(s.min().is_none());
        assert!(s.max().is_none());
    }

    #[test]
    fn push_tracks_mean_stdev_and_bounds() {
        let mut s = RunningStats::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        assert_eq!(s.count(), 8);
        assert!(close(s.mean().unwrap_or_default(), 5.0));
        assert!(close(s.stdev().unwrap_or_default(), 2.0));
        assert_eq!(s.min(), Some(2.0));
        assert_eq!(s.max(), Some(9.0));
    }

    #[test]
    fn merge_matches_single_pass() {
        let xs = [12.0, 3.5, 40.0, 7.25, 19.0, 1.0, 88.0];

        let mut whole = RunningStats::default();
        xs.iter().for_each(|x| whole.push(*x));

        let mut left = RunningStats::default();
        let mut right = RunningStats::default();
        xs[..3].iter().for_each(|x| left.push(*x));
        xs[3..].iter().for_each(|x| right.push(*x));
        left.merge(&right);

        assert_eq!(left.count(), whole.count());
        assert!(close(
            left.mean().unwrap_or_default(),
            whole.mean().unwrap_or_default()
        ));
        assert!(close(
            left.stdev().unwrap_or_default(),
            whole.stdev().unwrap_or_default()
        ));
        assert_eq!(left.min(), Some(1.0));
        assert_eq!(left.max(), Some(88.0));
    }

    #[test]
    fn merge_into_empty_copies_other() {
        let mut other = RunningStats::default();
        other.push(3.0);
        let mut s = RunningStats::default();
        s.merge(&other);
        assert_eq!(s, other);
    }
}
