//! Binned empirical distributions and the Normal approximations fitted on them.
use statrs::distribution::{ContinuousCDF, Normal};

/// Histogram over `[start, end)` with fixed bin width.
/// Values outside the range are counted in the first/last bin, but the moments use the exact values.
#[derive(Debug, Clone)]
pub struct Distribution {
    start: f64,
    bin_width: f64,
    counts: Vec<u64>,
    count: u64,
    sum: f64,
    sum_sq: f64,
    min_value: f64,
    max_value: f64,
}

impl Distribution {
    pub fn new(start: f64, end: f64, bin_width: f64) -> Self {
        assert!(start < end && 0f64 < bin_width, "{start},{end},{bin_width}");
        let bins = ((end - start) / bin_width).ceil() as usize;
        Self {
            start,
            bin_width,
            counts: vec![0; bins.max(1)],
            count: 0,
            sum: 0f64,
            sum_sq: 0f64,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }
    fn bin_of(&self, x: f64) -> usize {
        if x <= self.start {
            0
        } else {
            (((x - self.start) / self.bin_width).floor() as usize).min(self.counts.len() - 1)
        }
    }
    fn bin_value(&self, bin: usize) -> f64 {
        self.start + bin as f64 * self.bin_width
    }
    pub fn add(&mut self, x: f64) {
        let bin = self.bin_of(x);
        self.counts[bin] += 1;
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
        self.min_value = self.min_value.min(x);
        self.max_value = self.max_value.max(x);
    }
    pub fn count(&self) -> u64 {
        self.count
    }
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
    pub fn average(&self) -> f64 {
        match self.count {
            0 => 0f64,
            n => self.sum / n as f64,
        }
    }
    pub fn variance(&self) -> f64 {
        match self.count {
            0 | 1 => 0f64,
            n => {
                let n = n as f64;
                let mean = self.sum / n;
                (self.sum_sq / n - mean * mean).max(0f64)
            }
        }
    }
    pub fn min_value(&self) -> f64 {
        if self.is_empty() {
            0f64
        } else {
            self.min_value
        }
    }
    pub fn max_value(&self) -> f64 {
        if self.is_empty() {
            0f64
        } else {
            self.max_value
        }
    }
    /// The lower bound of the most populated bin whose lower bound lies in `[lower, upper]`.
    /// Ties are broken toward the smallest value. Returns the average if no bin qualifies.
    pub fn local_mode(&self, lower: f64, upper: f64) -> f64 {
        let first = self.bin_of(lower);
        let last = self.bin_of(upper);
        (first..=last)
            .filter(|&bin| {
                let value = self.bin_value(bin);
                lower - self.bin_width < value && value <= upper
            })
            .filter(|&bin| 0 < self.counts[bin])
            .max_by(|&a, &b| self.counts[a].cmp(&self.counts[b]).then(b.cmp(&a)))
            .map(|bin| self.bin_value(bin))
            .unwrap_or_else(|| self.average())
    }
    /// Spread of the peak at `mode`, measured on the bins at or below it.
    /// The upper tail of these metrics is long and noisy, so it is ignored.
    pub fn peak_standard_deviation(&self, mode: f64) -> f64 {
        let last = self.bin_of(mode);
        let (sq, n) = self.counts[..=last]
            .iter()
            .enumerate()
            .filter(|(_, &c)| 0 < c)
            .fold((0f64, 0u64), |(sq, n), (bin, &c)| {
                let diff = self.bin_value(bin) - mode;
                (sq + diff * diff * c as f64, n + c)
            });
        if n < 2 || sq <= 0f64 {
            self.variance().sqrt()
        } else {
            (sq / n as f64).sqrt()
        }
    }
}

/// Normal approximation that tolerates a degenerate (zero) variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalFit {
    mean: f64,
    variance: f64,
}

impl NormalFit {
    pub fn new(mean: f64, variance: f64) -> Self {
        let variance = if variance.is_finite() { variance.max(0f64) } else { 0f64 };
        Self { mean, variance }
    }
    pub fn mean(&self) -> f64 {
        self.mean
    }
    pub fn variance(&self) -> f64 {
        self.variance
    }
    pub fn sd(&self) -> f64 {
        self.variance.sqrt()
    }
    /// P(X <= x).
    pub fn cdf(&self, x: f64) -> f64 {
        let step = || match x.partial_cmp(&self.mean) {
            Some(std::cmp::Ordering::Less) => 0f64,
            Some(std::cmp::Ordering::Equal) => 0.5,
            _ => 1f64,
        };
        if self.variance <= 0f64 {
            return step();
        }
        match Normal::new(self.mean, self.sd()) {
            Ok(normal) => normal.cdf(x),
            Err(_) => step(),
        }
    }
    /// P(X > x).
    pub fn upper_tail(&self, x: f64) -> f64 {
        1f64 - self.cdf(x)
    }
}

/// Phred-like transform of a probability, rounded and capped.
pub fn phred(p: f64, cap: u32) -> u32 {
    if p <= 0f64 {
        return cap;
    }
    let score = (-10f64 * p.min(1f64).log10()).round();
    (score.max(0f64) as u32).min(cap)
}

/// Median of the values, taking the upper median on even sizes. The input is sorted in place.
pub fn upper_median(xs: &mut [f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    Some(xs[xs.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn moments() {
        let mut dist = Distribution::new(0f64, 100f64, 1f64);
        for x in [2f64, 4f64, 4f64, 4f64, 5f64, 5f64, 7f64, 9f64] {
            dist.add(x);
        }
        assert_eq!(dist.count(), 8);
        assert!((dist.average() - 5f64).abs() < 1e-9);
        assert!((dist.variance() - 4f64).abs() < 1e-9);
        assert_eq!(dist.min_value(), 2f64);
        assert_eq!(dist.max_value(), 9f64);
    }
    #[test]
    fn local_mode_window() {
        let mut dist = Distribution::new(0f64, 100f64, 1f64);
        for _ in 0..10 {
            dist.add(3f64);
        }
        for _ in 0..6 {
            dist.add(20f64);
        }
        assert_eq!(dist.local_mode(0f64, 100f64), 3f64);
        assert_eq!(dist.local_mode(10f64, 100f64), 20f64);
        // Nothing in range.
        assert_eq!(dist.local_mode(50f64, 60f64), dist.average());
    }
    #[test]
    fn out_of_range_values() {
        let mut dist = Distribution::new(0f64, 10f64, 1f64);
        dist.add(-3f64);
        dist.add(1000f64);
        assert_eq!(dist.count(), 2);
        assert_eq!(dist.max_value(), 1000f64);
        assert_eq!(dist.local_mode(9f64, 10f64), 9f64);
    }
    #[test]
    fn degenerate_normal() {
        let normal = NormalFit::new(10f64, 0f64);
        assert_eq!(normal.cdf(9f64), 0f64);
        assert_eq!(normal.cdf(10f64), 0.5);
        assert_eq!(normal.upper_tail(11f64), 0f64);
        let normal = NormalFit::new(0f64, 1f64);
        assert!((normal.cdf(0f64) - 0.5).abs() < 1e-9);
        assert!(normal.upper_tail(3.1) < 0.001);
    }
    #[test]
    fn phred_transform() {
        assert_eq!(phred(0.5, 100), 3);
        assert_eq!(phred(0.01, 100), 20);
        assert_eq!(phred(0f64, 100), 100);
        assert_eq!(phred(1e-30, 100), 100);
        assert_eq!(phred(1f64, 100), 0);
    }
    #[test]
    fn median() {
        assert_eq!(upper_median(&mut [3f64, 1f64, 2f64, 10f64]), Some(3f64));
        assert_eq!(upper_median(&mut []), None);
    }
}
