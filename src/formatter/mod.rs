pub struct Formatter {}

impl Formatter {
    const MEGABYTE: f64 = 1024.0 * 1024.0;

    pub fn format_size(size: u64, precision: u8) -> String {
        let mut size_float = size as f64;
        let mut size_unit = "B";

        for unit in ["KB", "MB", "GB", "TB"] {
            if size_float <= 1024.0 {
                break;
            }
            size_float /= 1024.0;
            size_unit = unit;
        }

        format!(
            "{number:.prec$} {unit}",
            number = size_float,
            prec = precision as usize,
            unit = size_unit
        )
    }

    /// Size in megabytes rounded to three decimals, printed without
    /// trailing zeros but always with one decimal place (`1.0`, `0.125`).
    pub fn format_megabytes(size: u64) -> String {
        let megabytes = ((size as f64 / Self::MEGABYTE) * 1000.0).round() / 1000.0;
        format!("{:?} MB", megabytes)
    }
}
