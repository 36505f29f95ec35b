use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter};
use std::io;

/// A JSON formatter writing every float with a fixed number of decimal digits.
///
/// Created per serialize call, so concurrent calls with different precisions
/// never see each other's setting.
#[derive(Debug, Clone, Copy)]
pub struct PrecisionFormatter {
    digits: Option<usize>,
}

impl PrecisionFormatter {
    /// `None` keeps serde_json's shortest round-trip representation.
    pub fn new(digits: Option<usize>) -> Self {
        PrecisionFormatter { digits }
    }
}

impl Formatter for PrecisionFormatter {
    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        match self.digits {
            Some(digits) => write!(writer, "{:.*}", digits, value),
            None => CompactFormatter.write_f64(writer, value),
        }
    }

    fn write_f32<W>(&mut self, writer: &mut W, value: f32) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.write_f64(writer, value as f64)
    }
}

/// Serialize `value` to compact JSON text with the given float precision.
pub fn to_string_with_precision<T: Serialize + ?Sized>(
    value: &T,
    digits: Option<usize>,
) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrecisionFormatter::new(digits));
    value.serialize(&mut ser)?;
    // the formatter only ever writes UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
