// Mann-Whitney U (Wilcoxon rank-sum) test
//
// Ranks the pooled sample with midranks for ties and derives U for the first
// sample. P-values come from the exact null distribution of U when it is cheap
// and valid (no ties, one sample with at most 8 values), otherwise from the
// normal approximation with tie and continuity correction.
//
// Uses statrs (crates.io) for the standard normal survival function.

use crate::error::{PipelineError, Result};
use statrs::distribution::{ContinuousCDF, Normal};

/// Largest sample size for which the exact distribution is used
const EXACT_MAX_SIZE: usize = 8;

/// Direction of the alternative hypothesis, stated for the first sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alternative {
    /// First sample tends to be larger
    Greater,
    /// Samples differ in location
    TwoSided,
    /// First sample tends to be smaller
    Less,
}

/// How the p-value was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Exact,
    Asymptotic,
}

/// Result of a rank-sum test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankSumTest {
    /// U statistic of the first sample
    pub statistic: f64,
    pub pvalue: f64,
    pub method: Method,
}

/// Midranks (1-based) of `values` and the tie term `sum(t^3 - t)` over tie groups
pub fn midranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end (0-based) share ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

/// Number of arrangements yielding each value of U for sample sizes `m`, `n`
///
/// These are the coefficients of the Gaussian binomial
/// `prod_{i=1..m} (1 - q^(n+i)) / (1 - q^i)`, computed as a truncated power series.
fn u_frequencies(m: usize, n: usize) -> Vec<f64> {
    let (m, n) = if m <= n { (m, n) } else { (n, m) };
    let len = m * n + 1;
    let mut coeffs = vec![0.0; len];
    coeffs[0] = 1.0;
    for i in 1..=m {
        let shift = n + i;
        for k in (shift..len).rev() {
            coeffs[k] -= coeffs[k - shift];
        }
        for k in i..len {
            coeffs[k] += coeffs[k - i];
        }
    }
    coeffs
}

/// P(U >= u) under the null hypothesis
fn exact_sf(u: f64, m: usize, n: usize) -> f64 {
    let freqs = u_frequencies(m, n);
    let total: f64 = freqs.iter().sum();
    let start = u.max(0.0).ceil() as usize;
    let tail: f64 = freqs.iter().skip(start).sum();
    tail / total
}

fn normal_sf(z: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| PipelineError::Distribution(e.to_string()))?;
    Ok(normal.sf(z))
}

/// Mann-Whitney U test of `x` against `y`
///
/// # Example
/// ```
/// use delegation_metrics::compare::{mann_whitney_u, Alternative};
///
/// let result = mann_whitney_u(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], Alternative::TwoSided).unwrap();
/// assert_eq!(result.statistic, 0.0);
/// assert!((result.pvalue - 0.1).abs() < 1e-12);
/// ```
pub fn mann_whitney_u(x: &[f64], y: &[f64], alternative: Alternative) -> Result<RankSumTest> {
    if x.is_empty() || y.is_empty() {
        return Err(PipelineError::EmptySample);
    }

    let n1 = x.len();
    let n2 = y.len();
    let pooled: Vec<f64> = x.iter().chain(y).copied().collect();
    let (ranks, tie_term) = midranks(&pooled);

    let r1: f64 = ranks[..n1].iter().sum();
    let u1 = r1 - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;

    let (u, factor) = match alternative {
        Alternative::Greater => (u1, 1.0),
        Alternative::Less => (u2, 1.0),
        Alternative::TwoSided => (u1.max(u2), 2.0),
    };

    let ties = tie_term > 0.0;
    let method = if (n1 > EXACT_MAX_SIZE && n2 > EXACT_MAX_SIZE) || ties {
        Method::Asymptotic
    } else {
        Method::Exact
    };

    let tail = match method {
        Method::Exact => exact_sf(u, n1, n2),
        Method::Asymptotic => {
            let n = (n1 + n2) as f64;
            let mu = (n1 * n2) as f64 / 2.0;
            let variance =
                (n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
            if variance <= 0.0 {
                // every value tied: no evidence in any direction
                1.0
            } else {
                normal_sf((u - mu - 0.5) / variance.sqrt())?
            }
        }
    };

    Ok(RankSumTest {
        statistic: u1,
        pvalue: (tail * factor).clamp(0.0, 1.0),
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_midranks_with_ties() {
        let (ranks, tie_term) = midranks(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(ranks, vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(tie_term, 6.0);
    }

    #[test]
    fn test_u_frequencies_small() {
        // m = n = 2: U in {0, 1, 2, 2, 3, 4}
        assert_eq!(u_frequencies(2, 2), vec![1.0, 1.0, 2.0, 1.0, 1.0]);
        assert_eq!(u_frequencies(1, 3), vec![1.0, 1.0, 1.0, 1.0]);
        let total: f64 = u_frequencies(3, 5).iter().sum();
        assert_eq!(total, 56.0);
    }

    #[test]
    fn test_exact_separated_samples() {
        let x = [1.0, 2.0, 3.0];
        let y = [4.0, 5.0, 6.0];

        let greater = mann_whitney_u(&x, &y, Alternative::Greater).unwrap();
        assert_eq!(greater.method, Method::Exact);
        assert_eq!(greater.statistic, 0.0);
        assert!((greater.pvalue - 1.0).abs() < 1e-12);

        let less = mann_whitney_u(&x, &y, Alternative::Less).unwrap();
        assert!((less.pvalue - 0.05).abs() < 1e-12);

        let two_sided = mann_whitney_u(&x, &y, Alternative::TwoSided).unwrap();
        assert!((two_sided.pvalue - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_asymptotic_with_ties() {
        let x = [1.0, 2.0, 2.0, 3.0];
        let y = [2.0, 3.0, 4.0, 5.0];
        let result = mann_whitney_u(&x, &y, Alternative::TwoSided).unwrap();
        assert_eq!(result.method, Method::Asymptotic);
        assert_eq!(result.statistic, 2.5);
        assert!(result.pvalue > 0.05 && result.pvalue < 0.2);
    }

    #[test]
    fn test_asymptotic_large_samples() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64 + 100.0).collect();
        let result = mann_whitney_u(&y, &x, Alternative::Greater).unwrap();
        assert_eq!(result.method, Method::Asymptotic);
        assert_eq!(result.statistic, 400.0);
        assert!(result.pvalue < 1e-6);
    }

    #[test]
    fn test_all_tied_is_uninformative() {
        let result = mann_whitney_u(&[1.0, 1.0], &[1.0, 1.0, 1.0], Alternative::Greater).unwrap();
        assert_eq!(result.pvalue, 1.0);
        assert_eq!(result.statistic, 3.0);
    }

    #[test]
    fn test_empty_sample_rejected() {
        assert!(matches!(
            mann_whitney_u(&[], &[1.0], Alternative::Greater),
            Err(PipelineError::EmptySample)
        ));
    }
}
