//! Density and mass functions shared by the template renderer and the
//! figure-script builtins.

use std::f64::consts::PI;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function for `x > 0`.
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // reflection
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = LANCZOS_COEFFICIENTS[0];
    let mut denom = x;
    for coefficient in &LANCZOS_COEFFICIENTS[1..] {
        denom += 1.0;
        acc += coefficient / denom;
    }
    let t = x + LANCZOS_G + 0.5;
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

#[must_use]
pub fn ln_factorial(k: f64) -> f64 {
    ln_gamma(k + 1.0)
}

/// `k!` for whole `k`, exact up to 20 and through the gamma function above.
#[must_use]
pub fn factorial(k: f64) -> f64 {
    if k < 0.0 {
        return f64::NAN;
    }
    if k <= 20.0 && k.fract() == 0.0 {
        let mut out = 1.0;
        let mut i = 2.0;
        while i <= k {
            out *= i;
            i += 1.0;
        }
        return out;
    }
    ln_factorial(k).exp()
}

/// Error function, Abramowitz and Stegun 7.1.26 (|error| < 1.5e-7).
#[must_use]
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[must_use]
pub fn normal_pdf(x: f64, mu: f64, sigma: f64) -> f64 {
    let z = (x - mu) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt())
}

#[must_use]
pub fn normal_cdf(x: f64, mu: f64, sigma: f64) -> f64 {
    0.5 * (1.0 + erf((x - mu) / (sigma * std::f64::consts::SQRT_2)))
}

#[must_use]
pub fn poisson_pmf(k: f64, lambda: f64) -> f64 {
    if k < 0.0 || k.fract() != 0.0 {
        return 0.0;
    }
    (k * lambda.ln() - lambda - ln_factorial(k)).exp()
}

#[must_use]
pub fn binomial_pmf(k: f64, n: f64, p: f64) -> f64 {
    if k < 0.0 || k > n || k.fract() != 0.0 {
        return 0.0;
    }
    if p <= 0.0 {
        return if k == 0.0 { 1.0 } else { 0.0 };
    }
    if p >= 1.0 {
        return if k == n { 1.0 } else { 0.0 };
    }
    let ln_choose = ln_factorial(n) - ln_factorial(k) - ln_factorial(n - k);
    (ln_choose + k * p.ln() + (n - k) * (1.0 - p).ln()).exp()
}

#[must_use]
pub fn beta_pdf(x: f64, alpha: f64, beta: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) {
        return 0.0;
    }
    if (x == 0.0 && alpha < 1.0) || (x == 1.0 && beta < 1.0) {
        return f64::INFINITY;
    }
    if (x == 0.0 && alpha > 1.0) || (x == 1.0 && beta > 1.0) {
        return 0.0;
    }
    let ln_beta = ln_gamma(alpha) + ln_gamma(beta) - ln_gamma(alpha + beta);
    let ln_density = match (x == 0.0, x == 1.0) {
        (true, _) => (beta - 1.0) * (1.0 - x).ln(),
        (_, true) => (alpha - 1.0) * x.ln(),
        _ => (alpha - 1.0) * x.ln() + (beta - 1.0) * (1.0 - x).ln(),
    };
    (ln_density - ln_beta).exp()
}

#[must_use]
pub fn exponential_pdf(x: f64, lambda: f64) -> f64 {
    if x < 0.0 {
        0.0
    } else {
        lambda * (-lambda * x).exp()
    }
}

#[must_use]
pub fn uniform_pdf(x: f64, a: f64, b: f64) -> f64 {
    if (a..=b).contains(&x) {
        1.0 / (b - a)
    } else {
        0.0
    }
}

/// `count` evenly spaced samples over `[start, stop]`, both ends included.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}
