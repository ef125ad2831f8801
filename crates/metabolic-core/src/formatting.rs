/// Round `value` to `decimals` places, leaving `NaN` and infinities alone.
///
/// # Examples
///
/// ```
/// use metabolic_core::formatting::round_to;
///
/// assert_eq!(round_to(1.005, 2), 1.01);
/// assert_eq!(round_to(-2.345, 1), -2.3);
/// assert!(round_to(f64::NAN, 2).is_nan());
/// ```
pub fn round_to(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10_f64.powi(decimals as i32);
    // Nudge by half an ULP at the target precision so exact midpoints that
    // are stored slightly below (1.005 → 1.00499…) still round away from zero.
    let abs_value = value.abs();
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;
    rounded.copysign(value)
}

/// Render a table cell: empty for missing (`NaN`) values, otherwise the
/// shortest representation that round-trips.
///
/// # Examples
///
/// ```
/// use metabolic_core::formatting::format_cell;
///
/// assert_eq!(format_cell(12.5), "12.5");
/// assert_eq!(format_cell(3.0), "3");
/// assert_eq!(format_cell(f64::NAN), "");
/// ```
pub fn format_cell(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Format a fractional hour count as `"7h 30m"`.
///
/// # Examples
///
/// ```
/// use metabolic_core::formatting::format_hours;
///
/// assert_eq!(format_hours(7.5), "7h 30m");
/// assert_eq!(format_hours(16.0), "16h");
/// assert_eq!(format_hours(0.25), "15m");
/// ```
pub fn format_hours(hours: f64) -> String {
    let total_minutes = (hours * 60.0).round() as i64;
    let h = total_minutes / 60;
    let m = total_minutes % 60;
    match (h, m) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
