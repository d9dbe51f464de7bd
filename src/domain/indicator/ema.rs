//! Recursive exponential moving average.
//!
//! EMA[0] = x[0], EMA[i] = alpha * x[i] + (1 - alpha) * EMA[i-1].
//! No warmup: the series is defined from the first value.

/// alpha = 2 / (span + 1)
pub fn span_alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// alpha = 1 / (1 + com)
pub fn com_alpha(com: f64) -> f64 {
    1.0 / (1.0 + com)
}

pub fn ewm(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}
