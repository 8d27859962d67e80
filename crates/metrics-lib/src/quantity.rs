//! Kubernetes resource quantity normalization
//!
//! Converts the quantity strings reported by `kubectl top`, the metrics API
//! and node capacity into canonical units:
//! - CPU in cores (`n` nanocores, `m` millicores, bare whole cores)
//! - memory in mebibytes (`Ki`, `Mi`, `Gi`, bare bytes)
//!
//! Suffixes are matched case-insensitively. Decimal memory suffixes (`k`, `M`,
//! `G`) are not part of the rule table and degrade to zero like any other
//! malformed quantity. None of these functions fail: a bad field contributes
//! `0` instead of aborting the aggregation.

const NANOCORES_PER_CORE: f64 = 1_000_000_000.0;
const MILLICORES_PER_CORE: f64 = 1_000.0;
const KIB_PER_MIB: f64 = 1024.0;
const MIB_PER_GIB: f64 = 1024.0;
const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Normalize a CPU quantity to cores
pub fn normalize_cpu(quantity: &str) -> f64 {
    let lower = quantity.trim().to_ascii_lowercase();

    let cores = if let Some(value) = lower.strip_suffix('n').and_then(parse_quantity) {
        Some(value / NANOCORES_PER_CORE)
    } else if let Some(value) = lower.strip_suffix('m').and_then(parse_quantity) {
        Some(value / MILLICORES_PER_CORE)
    } else {
        parse_quantity(&lower)
    };

    cores.unwrap_or(0.0)
}

/// Normalize a memory quantity to mebibytes
pub fn normalize_memory(quantity: &str) -> f64 {
    let lower = quantity.trim().to_ascii_lowercase();

    let mebibytes = if let Some(value) = lower.strip_suffix("ki").and_then(parse_quantity) {
        Some(value / KIB_PER_MIB)
    } else if let Some(value) = lower.strip_suffix("mi").and_then(parse_quantity) {
        Some(value)
    } else if let Some(value) = lower.strip_suffix("gi").and_then(parse_quantity) {
        Some(value * MIB_PER_GIB)
    } else {
        parse_quantity(&lower).map(|bytes| bytes / BYTES_PER_MIB)
    };

    mebibytes.unwrap_or(0.0)
}

/// Parse a percentage field such as `42%` or `42`
///
/// Surrounding whitespace and trailing `%` characters are ignored. Empty or
/// unparseable input yields `0`.
pub fn parse_percent(field: &str) -> f64 {
    field
        .trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Round to a fixed number of decimals, ties to even
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round_ties_even() / factor
}

fn parse_quantity(number: &str) -> Option<f64> {
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}
