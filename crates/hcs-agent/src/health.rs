//! Device health scoring.

/// Temperature above which a device is considered warm.
pub const WARN_TEMP_C: f64 = 80.0;
/// Temperature above which a device is considered critical.
pub const CRIT_TEMP_C: f64 = 90.0;
/// Per-error ECC penalty, applied up to [`ECC_THRESHOLD`] errors.
pub const ECC_PENALTY: f64 = 3.0;
/// ECC error count beyond which the flat penalty applies instead.
pub const ECC_THRESHOLD: u64 = 10;
/// Flat penalty once the ECC threshold is exceeded.
pub const ECC_FLAT_PENALTY: f64 = 50.0;

/// Score one device on `[0, 100]`.
///
/// Starts from 100, subtracts thermal and ECC penalties, then averages with
/// a detector-supplied score when the detector's opinion is lower.
pub fn score_device(temperature_c: f64, ecc_errors: u64, detector_score: Option<f64>) -> f64 {
    let mut score = 100.0;

    if temperature_c > WARN_TEMP_C {
        score -= 2.0 * (temperature_c - WARN_TEMP_C);
    }
    if temperature_c > CRIT_TEMP_C {
        score -= 5.0 * (temperature_c - CRIT_TEMP_C);
    }

    if ecc_errors > 0 {
        if ecc_errors <= ECC_THRESHOLD {
            score -= ECC_PENALTY * ecc_errors as f64;
        } else {
            score -= ECC_FLAT_PENALTY;
        }
    }

    if let Some(detector) = detector_score {
        if detector < score {
            score = (score + detector) / 2.0;
        }
    }

    score.clamp(0.0, 100.0)
}

/// Arithmetic mean of per-device scores; `None` when there are no devices.
pub fn aggregate(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
