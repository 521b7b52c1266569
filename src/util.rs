/// `floor(part * 100 / whole)`, capped at 100; zero when `whole` is zero.
pub fn percentage(part: u64, whole: u64) -> u32 {
    match whole {
        0 => 0,
        positive => (part.saturating_mul(100) / positive).min(100) as u32,
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}
