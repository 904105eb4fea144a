/// Rounds a currency amount to centavos.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Sum of `quantity × unit_cost` over line items, rounded.
pub fn line_total<I>(lines: I) -> f64
where
    I: IntoIterator<Item = (i64, f64)>,
{
    round2(lines.into_iter().map(|(qty, cost)| qty as f64 * cost).sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round2(10.005_000_1), 10.01);
        assert_eq!(round2(1.234), 1.23);
    }

    #[test]
    fn totals_lines() {
        assert_eq!(line_total(vec![(3, 12.5), (2, 0.1)]), 37.7);
        assert_eq!(line_total(Vec::<(i64, f64)>::new()), 0.0);
    }
}
