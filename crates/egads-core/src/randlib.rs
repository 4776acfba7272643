//! Convenience draws layered on [`Prng`]: integers, reals, strings and a
//! handful of continuous distributions.
//!
//! Every method pulls raw words from [`Prng::output`], so all of them
//! inherit its reseed and fork handling.

use std::f64::consts::PI;

use crate::error::PrngError;
use crate::prng::Prng;

/// Kinderman-Monahan ratio-of-uniforms constant, `4 * exp(-0.5) / sqrt(2)`.
const NV_MAGICCONST: f64 = 1.715_527_769_921_41;

/// Alphabet for [`Prng::rand_fname`].
const FNAME_CHARS: &[u8; 63] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.";

const TWO_POW_32: f64 = 4_294_967_296.0;

impl Prng {
    pub fn rand_u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        self.output(&mut b);
        u32::from_be_bytes(b)
    }

    pub fn rand_u64(&mut self) -> u64 {
        let mut b = [0u8; 8];
        self.output(&mut b);
        u64::from_be_bytes(b)
    }

    /// Uniform real in `[0, 1)`.
    pub fn rand_real(&mut self) -> f64 {
        f64::from(self.rand_u32()) / TWO_POW_32
    }

    /// Uniform real in `(0, 1]`, for formulas that take a logarithm or a
    /// reciprocal.
    fn rand_real_nonzero(&mut self) -> f64 {
        1.0 - self.rand_real()
    }

    /// Uniform integer in the inclusive range `[min, max]`.
    pub fn rand_range(&mut self, min: i64, max: i64) -> Result<i64, PrngError> {
        if min > max {
            return Err(PrngError::InvalidRange { min, max });
        }
        let span = (max as f64) - (min as f64) + 1.0;
        let r = loop {
            let r = self.rand_u32();
            if r != u32::MAX {
                break r;
            }
        };
        let offset = (f64::from(r) * span / f64::from(u32::MAX)).floor() as i64;
        Ok(min.saturating_add(offset).min(max))
    }

    /// `len` printable ASCII characters from `'!'` to `'~'`.
    pub fn rand_string(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| self.pick(33, 126) as u8 as char)
            .collect()
    }

    /// `len` characters safe for a file name: letters, digits and `'.'`.
    pub fn rand_fname(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| FNAME_CHARS[self.pick(0, FNAME_CHARS.len() as i64 - 1) as usize] as char)
            .collect()
    }

    fn pick(&mut self, min: i64, max: i64) -> i64 {
        // Bounds are constants with min <= max.
        self.rand_range(min, max).unwrap_or(min)
    }

    // -----------------------------------------------------------------------
    // Continuous distributions
    // -----------------------------------------------------------------------

    /// Gaussian via Box-Muller. Each pair of uniforms yields two variates;
    /// the second is cached for the next call.
    pub fn gauss(&mut self, mu: f64, sigma: f64) -> f64 {
        let z = match self.gauss_next.take() {
            Some(z) => z,
            None => {
                let x2pi = self.rand_real() * 2.0 * PI;
                let g2rad = (-2.0 * self.rand_real_nonzero().ln()).sqrt();
                self.gauss_next = Some(x2pi.sin() * g2rad);
                x2pi.cos() * g2rad
            }
        };
        mu + z * sigma
    }

    /// Gaussian via the Kinderman-Monahan ratio method.
    pub fn normal(&mut self, mu: f64, sigma: f64) -> f64 {
        loop {
            let r1 = self.rand_real();
            let r2 = self.rand_real_nonzero();
            let z = NV_MAGICCONST * (r1 - 0.5) / r2;
            if z * z / 4.0 <= -r2.ln() {
                return mu + z * sigma;
            }
        }
    }

    pub fn lognormal(&mut self, mu: f64, sigma: f64) -> f64 {
        self.normal(mu, sigma).exp()
    }

    /// Exponential with rate `lambda`.
    pub fn expo(&mut self, lambda: f64) -> f64 {
        let r = loop {
            let r = self.rand_real();
            if r > 1e-7 {
                break r;
            }
        };
        -r.ln() / lambda
    }

    /// Beta built from two exponential draws.
    pub fn beta(&mut self, alpha: f64, beta: f64) -> f64 {
        let e1 = self.expo(alpha);
        let e2 = self.expo(1.0 / beta);
        e2 / (e1 + e2)
    }

    pub fn pareto(&mut self, alpha: f64) -> f64 {
        let r = self.rand_real_nonzero();
        1.0 / r.powf(1.0 / alpha)
    }

    pub fn weibull(&mut self, alpha: f64, beta: f64) -> f64 {
        let r = self.rand_real_nonzero();
        alpha * (-r.ln()).powf(1.0 / beta)
    }

    /// Uniform real in `[min, max)`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.rand_real()
    }

    /// Circular uniform: an angle spread over `arc` around `mean`, wrapped
    /// into `[0, PI)`. The result is the angle itself, not a fraction of
    /// `PI`, so a narrow arc around `mean` stays near `mean mod PI`.
    pub fn cunif(&mut self, mean: f64, arc: f64) -> f64 {
        (mean + arc * (self.rand_real() - 0.5)).rem_euclid(PI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prng::SEED_LEN;
    use std::time::Duration;

    fn prng() -> Prng {
        let seed: Vec<u8> = (0..SEED_LEN as u8).collect();
        Prng::new(&seed, Duration::from_secs(3600)).unwrap()
    }

    fn mean(xs: &[f64]) -> f64 {
        xs.iter().sum::<f64>() / xs.len() as f64
    }

    fn variance(xs: &[f64]) -> f64 {
        let m = mean(xs);
        xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
    }

    // -----------------------------------------------------------------------
    // Discrete draws
    // -----------------------------------------------------------------------

    #[test]
    fn test_rand_real_in_unit_interval() {
        let mut p = prng();
        for _ in 0..10_000 {
            let r = p.rand_real();
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn test_rand_range_bounds_and_coverage() {
        let mut p = prng();
        let mut seen = [false; 21];
        for _ in 0..5000 {
            let v = p.rand_range(-10, 10).unwrap();
            assert!((-10..=10).contains(&v));
            seen[(v + 10) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s), "every value should appear");
    }

    #[test]
    fn test_rand_range_single_value() {
        let mut p = prng();
        for _ in 0..100 {
            assert_eq!(p.rand_range(7, 7).unwrap(), 7);
        }
    }

    #[test]
    fn test_rand_range_rejects_inverted() {
        let mut p = prng();
        assert_eq!(
            p.rand_range(5, 4),
            Err(PrngError::InvalidRange { min: 5, max: 4 })
        );
    }

    #[test]
    fn test_rand_string_charset() {
        let mut p = prng();
        let s = p.rand_string(500);
        assert_eq!(s.len(), 500);
        assert!(s.bytes().all(|b| (33..=126).contains(&b)));
        assert!(p.rand_string(0).is_empty());
    }

    #[test]
    fn test_rand_fname_charset() {
        let mut p = prng();
        let s = p.rand_fname(500);
        assert_eq!(s.len(), 500);
        assert!(s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.'));
    }

    #[test]
    fn test_words_are_big_endian_output() {
        let mut a = prng();
        let mut b = prng();
        let w = a.rand_u32();
        let mut raw = [0u8; 4];
        b.output(&mut raw);
        assert_eq!(w, u32::from_be_bytes(raw));
    }

    // -----------------------------------------------------------------------
    // Continuous distributions
    // -----------------------------------------------------------------------

    #[test]
    fn test_uniform_moments() {
        let mut p = prng();
        let xs: Vec<f64> = (0..20_000).map(|_| p.uniform(2.0, 4.0)).collect();
        assert!(xs.iter().all(|x| (2.0..4.0).contains(x)));
        assert!((mean(&xs) - 3.0).abs() < 0.05);
    }

    #[test]
    fn test_gauss_moments() {
        let mut p = prng();
        let xs: Vec<f64> = (0..20_000).map(|_| p.gauss(5.0, 2.0)).collect();
        assert!((mean(&xs) - 5.0).abs() < 0.1);
        assert!((variance(&xs).sqrt() - 2.0).abs() < 0.1);
    }

    #[test]
    fn test_gauss_caches_second_variate() {
        let mut p = prng();
        p.gauss(0.0, 1.0);
        assert!(p.gauss_next.is_some());
        p.gauss(0.0, 1.0);
        assert!(p.gauss_next.is_none());
    }

    #[test]
    fn test_normal_moments() {
        let mut p = prng();
        let xs: Vec<f64> = (0..20_000).map(|_| p.normal(-1.0, 0.5)).collect();
        assert!((mean(&xs) + 1.0).abs() < 0.05);
        assert!((variance(&xs).sqrt() - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_lognormal_positive() {
        let mut p = prng();
        for _ in 0..1000 {
            assert!(p.lognormal(0.0, 1.0) > 0.0);
        }
    }

    #[test]
    fn test_expo_mean() {
        let mut p = prng();
        let xs: Vec<f64> = (0..20_000).map(|_| p.expo(2.0)).collect();
        assert!(xs.iter().all(|&x| x >= 0.0 && x.is_finite()));
        assert!((mean(&xs) - 0.5).abs() < 0.03);
    }

    #[test]
    fn test_beta_in_unit_interval() {
        let mut p = prng();
        for _ in 0..2000 {
            let b = p.beta(2.0, 3.0);
            assert!((0.0..=1.0).contains(&b));
        }
    }

    #[test]
    fn test_pareto_and_weibull_finite() {
        let mut p = prng();
        for _ in 0..5000 {
            let x = p.pareto(3.0);
            assert!(x >= 1.0 && x.is_finite());
            let w = p.weibull(1.5, 2.0);
            assert!(w >= 0.0 && w.is_finite());
        }
    }

    #[test]
    fn test_cunif_range() {
        let mut p = prng();
        for _ in 0..2000 {
            let c = p.cunif(1.0, 2.0 * PI);
            assert!((0.0..PI).contains(&c));
        }
    }

    #[test]
    fn test_cunif_wraps_angle() {
        let mut p = prng();
        for _ in 0..500 {
            let c = p.cunif(1.0, 0.1);
            assert!((0.95..=1.05).contains(&c), "c={c}");
            let w = p.cunif(4.0, 0.1);
            assert!((4.0 - PI - 0.05..=4.0 - PI + 0.05).contains(&w), "w={w}");
        }
    }

    #[test]
    #[ignore] // slow: chi-square over one million draws
    fn test_rand_range_chi_square() {
        let mut p = prng();
        let mut counts = [0u64; 16];
        let n = 1_000_000u64;
        for _ in 0..n {
            counts[p.rand_range(0, 15).unwrap() as usize] += 1;
        }
        let expected = n as f64 / 16.0;
        let chi2: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        // 15 degrees of freedom, p = 0.001 critical value.
        assert!(chi2 < 37.7, "chi2 = {chi2}");
    }
}
