/// Render `quantity` with a fixed number of decimals.
pub fn format_amount(quantity: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, quantity)
}

/// Scale an integer mantissa by `10^-decimal_places`, the way hledger encodes decimals.
pub fn quantity_from_mantissa(mantissa: i64, decimal_places: u32) -> f64 {
    mantissa as f64 / 10f64.powi(decimal_places as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mantissa_scaling() {
        assert_eq!(quantity_from_mantissa(12345, 2), 123.45);
        assert_eq!(quantity_from_mantissa(-5, 0), -5.0);
        assert_eq!(format_amount(quantity_from_mantissa(1, 3), 3), "0.001");
    }
}
