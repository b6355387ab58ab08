//! Binary encodings of the built-in scalar types.
//!
//! Every function here works on the element payload only; the caller owns the
//! surrounding length word.

use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Timelike, Utc};
use num_bigint::{BigUint, Sign};
use num_traits::Zero;

use super::decoder::Trail;
use super::shape::Slot;
use super::types::{BigInt, Decimal, Duration, RelativeDuration};
use super::value::Value;
use super::Path;
use crate::descriptor::ScalarType;
use crate::driver::protocol::{Reader, Writer};
use crate::error::{DriverError, DriverResult};

/// 2000-01-01T00:00:00Z relative to the Unix epoch.
const EPOCH_OFFSET_MICROS: i64 = 946_684_800_000_000;

/// `num_days_from_ce` of 2000-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 730_120;

const MICROS_PER_DAY: i64 = 86_400_000_000;

const JSON_FORMAT: u8 = 1;

/// Sign words of the numeric encodings.
const SIGN_POSITIVE: u16 = 0x0000;
const SIGN_NEGATIVE: u16 = 0x4000;

/// Radix of the numeric digit groups.
const NBASE: u32 = 10_000;

/// Scalar kinds that may be decoded into a destination of another kind.
pub(crate) fn compatible(wire: ScalarType, dest: ScalarType) -> bool {
    wire == dest || (wire == ScalarType::Json && dest == ScalarType::Str)
}

fn bad_data(at: &Trail<'_>, kind: ScalarType, what: impl Into<String>) -> DriverError {
    DriverError::mismatch(at.path(), format!("valid {}", kind.name()), what)
}

/// Numeric payload: `digits[i] * 10000^(weight - i)`, shown with `scale`
/// digits after the point.
struct Numeric {
    negative: bool,
    weight: i16,
    scale: u16,
    digits: Vec<u16>,
}

impl Numeric {
    /// Integer formed by the digit groups alone.
    fn magnitude(&self) -> BigUint {
        self.digits
            .iter()
            .fold(BigUint::zero(), |acc, d| acc * NBASE + u32::from(*d))
    }

    /// Power of 10000 that scales [`Numeric::magnitude`] to the value.
    fn exponent(&self) -> i64 {
        i64::from(self.weight) + 1 - self.digits.len() as i64
    }

    fn sign(&self) -> Sign {
        if self.negative {
            Sign::Minus
        } else {
            Sign::Plus
        }
    }

    /// Split `magnitude / 10^scale` into digit groups.
    fn from_magnitude(
        negative: bool,
        magnitude: &BigUint,
        scale: u16,
        path: &Path,
    ) -> DriverResult<Self> {
        let pad = (4 - scale as usize % 4) % 4;
        let frac_groups = (scale as usize + pad) / 4;
        let mut text = magnitude.to_str_radix(10);
        text.push_str(&"0".repeat(pad));
        let text = "0".repeat((4 - text.len() % 4) % 4) + &text;

        let mut digits: Vec<u16> = text
            .as_bytes()
            .chunks(4)
            .map(|c| c.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
            .collect();
        let mut weight = digits.len() as i64 - 1 - frac_groups as i64;

        let leading = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading);
        weight -= leading as i64;
        while digits.last() == Some(&0) {
            digits.pop();
        }
        if digits.is_empty() {
            weight = 0;
        }

        let too_large = || {
            DriverError::mismatch(path, "a numeric value within wire limits", "too many digits")
        };
        if u16::try_from(digits.len()).is_err() {
            return Err(too_large());
        }
        Ok(Numeric {
            negative: negative && !digits.is_empty(),
            weight: i16::try_from(weight).map_err(|_| too_large())?,
            scale,
            digits,
        })
    }
}

fn pop_numeric(r: &mut Reader<'_>, kind: ScalarType, at: &Trail<'_>) -> DriverResult<Numeric> {
    let ndigits = r.pop_u16()?;
    let weight = r.pop_i16()?;
    let negative = match r.pop_u16()? {
        SIGN_POSITIVE => false,
        SIGN_NEGATIVE => true,
        other => return Err(bad_data(at, kind, format!("sign word 0x{:04x}", other))),
    };
    let scale = r.pop_u16()?;
    let mut digits = Vec::with_capacity(ndigits as usize);
    for _ in 0..ndigits {
        let digit = r.pop_u16()?;
        if u32::from(digit) >= NBASE {
            return Err(bad_data(at, kind, format!("digit group {}", digit)));
        }
        digits.push(digit);
    }
    Ok(Numeric {
        negative,
        weight,
        scale,
        digits,
    })
}

fn push_numeric(w: &mut Writer, n: &Numeric) {
    // length checked in Numeric::from_magnitude
    w.push_u16(n.digits.len() as u16);
    w.push_i16(n.weight);
    w.push_u16(if n.negative { SIGN_NEGATIVE } else { SIGN_POSITIVE });
    w.push_u16(n.scale);
    for digit in &n.digits {
        w.push_u16(*digit);
    }
}

fn decode_bigint(r: &mut Reader<'_>, at: &Trail<'_>) -> DriverResult<BigInt> {
    let kind = ScalarType::BigInt;
    let n = pop_numeric(r, kind, at)?;
    if n.scale != 0 {
        return Err(bad_data(at, kind, format!("scale {}", n.scale)));
    }
    let exponent = n.exponent();
    if exponent < 0 && !n.digits.is_empty() {
        return Err(bad_data(at, kind, "fractional digit groups"));
    }
    let magnitude = n.magnitude() * BigUint::from(NBASE).pow(exponent.max(0) as u32);
    Ok(BigInt::from_biguint(n.sign(), magnitude))
}

fn decode_decimal(r: &mut Reader<'_>, at: &Trail<'_>) -> DriverResult<Decimal> {
    let kind = ScalarType::Decimal;
    let n = pop_numeric(r, kind, at)?;
    // power of ten that turns the digit groups into the mantissa
    let shift = 4 * n.exponent() + i64::from(n.scale);
    let mut magnitude = n.magnitude();
    if shift >= 0 {
        magnitude *= BigUint::from(10u32).pow(shift as u32);
    } else {
        let divisor = BigUint::from(10u32).pow(shift.unsigned_abs() as u32);
        if !(&magnitude % &divisor).is_zero() {
            return Err(bad_data(at, kind, "digits beyond the scale"));
        }
        magnitude /= divisor;
    }
    Ok(Decimal::new(BigInt::from_biguint(n.sign(), magnitude), n.scale))
}

fn utf8(at: &Trail<'_>, kind: ScalarType, data: &[u8]) -> DriverResult<String> {
    String::from_utf8(data.to_vec()).map_err(|_| bad_data(at, kind, "invalid utf-8"))
}

fn pop_json_text<'a>(r: &mut Reader<'a>, at: &Trail<'_>) -> DriverResult<&'a [u8]> {
    let format = r.pop_u8()?;
    if format != JSON_FORMAT {
        return Err(bad_data(
            at,
            ScalarType::Json,
            format!("json format {}", format),
        ));
    }
    Ok(r.rest())
}

/// Decode one scalar payload into `slot`.
pub(crate) fn decode_scalar(
    kind: ScalarType,
    r: &mut Reader<'_>,
    slot: Slot<'_>,
    at: &Trail<'_>,
) -> DriverResult<()> {
    match (kind, slot) {
        (ScalarType::Uuid, Slot::Uuid(v)) => *v = r.pop_uuid()?,
        (ScalarType::Str, Slot::Str(v)) => *v = utf8(at, kind, r.rest())?,
        (ScalarType::Bytes, Slot::Bytes(v)) => *v = Bytes::copy_from_slice(r.rest()),
        (ScalarType::Int16, Slot::Int16(v)) => *v = r.pop_i16()?,
        (ScalarType::Int32, Slot::Int32(v)) => *v = r.pop_i32()?,
        (ScalarType::Int64, Slot::Int64(v)) => *v = r.pop_i64()?,
        (ScalarType::Float32, Slot::Float32(v)) => *v = r.pop_f32()?,
        (ScalarType::Float64, Slot::Float64(v)) => *v = r.pop_f64()?,
        (ScalarType::Bool, Slot::Bool(v)) => {
            *v = match r.pop_u8()? {
                0 => false,
                1 => true,
                other => return Err(bad_data(at, kind, format!("byte {}", other))),
            }
        }
        (ScalarType::Decimal, Slot::Decimal(v)) => *v = decode_decimal(r, at)?,
        (ScalarType::BigInt, Slot::BigInt(v)) => *v = decode_bigint(r, at)?,
        (ScalarType::DateTime, Slot::DateTime(v)) => {
            let micros = r.pop_i64()?;
            *v = micros
                .checked_add(EPOCH_OFFSET_MICROS)
                .and_then(DateTime::<Utc>::from_timestamp_micros)
                .ok_or_else(|| bad_data(at, kind, "timestamp out of range"))?;
        }
        (ScalarType::LocalDateTime, Slot::LocalDateTime(v)) => {
            let micros = r.pop_i64()?;
            *v = micros
                .checked_add(EPOCH_OFFSET_MICROS)
                .and_then(DateTime::<Utc>::from_timestamp_micros)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| bad_data(at, kind, "timestamp out of range"))?;
        }
        (ScalarType::LocalDate, Slot::LocalDate(v)) => {
            let days = r.pop_i32()?;
            *v = days
                .checked_add(EPOCH_DAYS_FROM_CE)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .ok_or_else(|| bad_data(at, kind, "date out of range"))?;
        }
        (ScalarType::LocalTime, Slot::LocalTime(v)) => {
            let micros = r.pop_i64()?;
            if !(0..MICROS_PER_DAY).contains(&micros) {
                return Err(bad_data(at, kind, format!("{} microseconds past midnight", micros)));
            }
            *v = NaiveTime::from_num_seconds_from_midnight_opt(
                (micros / 1_000_000) as u32,
                ((micros % 1_000_000) * 1_000) as u32,
            )
            .ok_or_else(|| bad_data(at, kind, "time out of range"))?;
        }
        (ScalarType::Duration, Slot::Duration(v)) => {
            let micros = r.pop_i64()?;
            let days = r.pop_i32()?;
            let months = r.pop_i32()?;
            if days != 0 || months != 0 {
                return Err(bad_data(at, kind, "days or months component"));
            }
            *v = Duration::from_micros(micros);
        }
        (ScalarType::RelativeDuration, Slot::RelativeDuration(v)) => {
            *v = RelativeDuration {
                micros: r.pop_i64()?,
                days: r.pop_i32()?,
                months: r.pop_i32()?,
            };
        }
        (ScalarType::Json, Slot::Json(v)) => {
            let text = pop_json_text(r, at)?;
            *v = serde_json::from_slice(text).map_err(|e| bad_data(at, kind, e.to_string()))?;
        }
        (ScalarType::Json, Slot::Str(v)) => {
            let text = pop_json_text(r, at)?;
            *v = utf8(at, kind, text)?;
        }
        (kind, slot) => {
            return Err(DriverError::mismatch(at.path(), kind.name(), slot.kind_name()));
        }
    }
    Ok(())
}

/// Encode one scalar argument payload.
pub(crate) fn encode_scalar(
    kind: ScalarType,
    value: &Value,
    w: &mut Writer,
    path: &Path,
) -> DriverResult<()> {
    match (kind, value) {
        (ScalarType::Uuid, Value::Uuid(v)) => w.push_uuid(v),
        (ScalarType::Str, Value::Str(v)) => w.push_raw(v.as_bytes()),
        (ScalarType::Bytes, Value::Bytes(v)) => w.push_raw(v),
        (ScalarType::Int16, Value::Int16(v)) => w.push_i16(*v),
        (ScalarType::Int32, Value::Int32(v)) => w.push_i32(*v),
        (ScalarType::Int64, Value::Int64(v)) => w.push_i64(*v),
        (ScalarType::Float32, Value::Float32(v)) => w.push_f32(*v),
        (ScalarType::Float64, Value::Float64(v)) => w.push_f64(*v),
        (ScalarType::Bool, Value::Bool(v)) => w.push_u8(*v as u8),
        (ScalarType::Decimal, Value::Decimal(v)) => {
            let magnitude = v.mantissa().magnitude();
            let n = Numeric::from_magnitude(v.is_negative(), magnitude, v.scale(), path)?;
            push_numeric(w, &n);
        }
        (ScalarType::BigInt, Value::BigInt(v)) => {
            let n = Numeric::from_magnitude(v.sign() == Sign::Minus, v.magnitude(), 0, path)?;
            push_numeric(w, &n);
        }
        (ScalarType::DateTime, Value::DateTime(v)) => {
            w.push_i64(v.timestamp_micros() - EPOCH_OFFSET_MICROS)
        }
        (ScalarType::LocalDateTime, Value::LocalDateTime(v)) => {
            w.push_i64(v.and_utc().timestamp_micros() - EPOCH_OFFSET_MICROS)
        }
        (ScalarType::LocalDate, Value::LocalDate(v)) => {
            w.push_i32(v.num_days_from_ce() - EPOCH_DAYS_FROM_CE)
        }
        (ScalarType::LocalTime, Value::LocalTime(v)) => {
            let micros = v.num_seconds_from_midnight() as i64 * 1_000_000
                + (v.nanosecond() % 1_000_000_000) as i64 / 1_000;
            w.push_i64(micros);
        }
        (ScalarType::Duration, Value::Duration(v)) => {
            w.push_i64(v.to_micros());
            w.push_i32(0);
            w.push_i32(0);
        }
        (ScalarType::RelativeDuration, Value::RelativeDuration(v)) => {
            w.push_i64(v.micros);
            w.push_i32(v.days);
            w.push_i32(v.months);
        }
        (ScalarType::Json, Value::Json(v)) => {
            let text = serde_json::to_vec(v)
                .map_err(|e| DriverError::mismatch(path, "serializable json", e.to_string()))?;
            w.push_u8(JSON_FORMAT);
            w.push_raw(&text);
        }
        (ScalarType::Json, Value::Str(text)) => {
            w.push_u8(JSON_FORMAT);
            w.push_raw(text.as_bytes());
        }
        (kind, value) => {
            return Err(DriverError::mismatch(path, kind.name(), value.kind_name()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDateTime, TimeZone};

    fn round_trip<T: Default + crate::codec::Queryable>(kind: ScalarType, value: Value) -> T {
        let mut w = Writer::new();
        encode_scalar(kind, &value, &mut w, &Path::root("args")).unwrap();
        let mut out = T::default();
        decode_scalar(kind, &mut Reader::new(w.as_slice()), out.slot(), &Trail::Root).unwrap();
        out
    }

    #[test]
    fn test_datetime_epoch() {
        let epoch = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let mut w = Writer::new();
        encode_scalar(ScalarType::DateTime, &Value::DateTime(epoch), &mut w, &Path::root("args"))
            .unwrap();
        assert_eq!(w.as_slice(), &[0u8; 8]);

        let later = Utc.with_ymd_and_hms(2021, 6, 30, 12, 0, 1).unwrap();
        let decoded: chrono::DateTime<Utc> = round_trip(ScalarType::DateTime, Value::DateTime(later));
        assert_eq!(decoded, later);
    }

    #[test]
    fn test_local_types() {
        let date = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        let mut w = Writer::new();
        encode_scalar(ScalarType::LocalDate, &Value::LocalDate(date), &mut w, &Path::root("args"))
            .unwrap();
        assert_eq!(w.as_slice(), &(-1i32).to_be_bytes());

        let time = NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap();
        let decoded: NaiveTime = round_trip(ScalarType::LocalTime, Value::LocalTime(time));
        assert_eq!(decoded, time);

        let ldt = NaiveDateTime::new(date, time);
        let decoded: NaiveDateTime = round_trip(ScalarType::LocalDateTime, Value::LocalDateTime(ldt));
        assert_eq!(decoded, ldt);
    }

    #[test]
    fn test_numeric_wire_layout() {
        let v: Decimal = "-12345.678".parse().unwrap();
        let mut w = Writer::new();
        encode_scalar(ScalarType::Decimal, &Value::Decimal(v.clone()), &mut w, &Path::root("args"))
            .unwrap();
        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.pop_u16().unwrap(), 3);
        assert_eq!(r.pop_i16().unwrap(), 1);
        assert_eq!(r.pop_u16().unwrap(), SIGN_NEGATIVE);
        assert_eq!(r.pop_u16().unwrap(), 3);

        let decoded: Decimal = round_trip(ScalarType::Decimal, Value::Decimal(v.clone()));
        assert_eq!(decoded, v);

        let big = BigInt::from(i64::MIN);
        let decoded: BigInt = round_trip(ScalarType::BigInt, Value::BigInt(big.clone()));
        assert_eq!(decoded.to_string(), i64::MIN.to_string());
    }

    #[test]
    fn test_bigint_beyond_i64() {
        let big: BigInt = "-123456789012345678901234567890000000000".parse().unwrap();
        let mut w = Writer::new();
        encode_scalar(ScalarType::BigInt, &Value::BigInt(big.clone()), &mut w, &Path::root("args"))
            .unwrap();
        let mut r = Reader::new(w.as_slice());
        // trailing zero groups are implied by the weight
        assert_eq!(r.pop_u16().unwrap(), 8);
        assert_eq!(r.pop_i16().unwrap(), 9);

        let decoded: BigInt = round_trip(ScalarType::BigInt, Value::BigInt(big.clone()));
        assert_eq!(decoded, big);
    }

    #[test]
    fn test_small_decimal_weight() {
        let v = Decimal::new(5, 8);
        let mut w = Writer::new();
        encode_scalar(ScalarType::Decimal, &Value::Decimal(v.clone()), &mut w, &Path::root("args"))
            .unwrap();
        let mut r = Reader::new(w.as_slice());
        assert_eq!(r.pop_u16().unwrap(), 1);
        assert_eq!(r.pop_i16().unwrap(), -2);

        let decoded: Decimal = round_trip(ScalarType::Decimal, Value::Decimal(v.clone()));
        assert_eq!(decoded.to_string(), "0.00000005");
    }

    #[test]
    fn test_numeric_too_large_for_wire() {
        // 10^131072 needs a weight of 32768 groups
        let huge = BigInt::from(10u32).pow(131_072);
        let mut w = Writer::new();
        let err = encode_scalar(ScalarType::BigInt, &Value::BigInt(huge), &mut w, &Path::root("args"))
            .unwrap_err();
        assert_eq!(err.path(), Some("args"));

        let fits = BigInt::from(10u32).pow(131_068);
        let decoded: BigInt = round_trip(ScalarType::BigInt, Value::BigInt(fits.clone()));
        assert_eq!(decoded, fits);
    }

    #[test]
    fn test_bigint_rejects_fractions() {
        let mut w = Writer::new();
        w.push_u16(1);
        w.push_i16(-1);
        w.push_u16(SIGN_POSITIVE);
        w.push_u16(0);
        w.push_u16(5);
        let mut out = BigInt::default();
        let err = decode_scalar(
            ScalarType::BigInt,
            &mut Reader::new(w.as_slice()),
            Slot::BigInt(&mut out),
            &Trail::Root,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CodecMismatch);
    }

    #[test]
    fn test_json_into_value_and_string() {
        let json = serde_json::json!({"a": [1, 2]});
        let decoded: serde_json::Value = round_trip(ScalarType::Json, Value::Json(json.clone()));
        assert_eq!(decoded, json);

        let text: String = round_trip(ScalarType::Json, Value::Str("[1]".to_string()));
        assert_eq!(text, "[1]");
    }

    #[test]
    fn test_duration_rejects_calendar_parts() {
        let mut w = Writer::new();
        w.push_i64(5);
        w.push_i32(1);
        w.push_i32(0);
        let mut out = Duration::default();
        let err = decode_scalar(
            ScalarType::Duration,
            &mut Reader::new(w.as_slice()),
            Slot::Duration(&mut out),
            &Trail::Root,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::CodecMismatch { .. }));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut w = Writer::new();
        let err = encode_scalar(ScalarType::Int32, &Value::Int64(1), &mut w, &Path::root("args").index(0))
            .unwrap_err();
        assert_eq!(err.path(), Some("args[0]"));

        let mut s = String::new();
        let err = decode_scalar(
            ScalarType::Int32,
            &mut Reader::new(&[0, 0, 0, 1]),
            Slot::Str(&mut s),
            &Trail::Root,
        )
        .unwrap_err();
        assert!(err.to_string().contains("std::int32"));
    }

    #[test]
    fn test_short_payload_is_framing_error() {
        let mut out = 0i64;
        let err = decode_scalar(
            ScalarType::Int64,
            &mut Reader::new(&[0, 1]),
            Slot::Int64(&mut out),
            &Trail::Root,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Framing(_)));
    }
}
