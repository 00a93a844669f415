//! Built-in scalar converters.
//!
//! Every converter treats unparseable input as a soft no-value; only genuine
//! misconfiguration (an enum parameter without a variant table) is a hard
//! error.

use super::{ArgumentValue, Conversion, Converter, ConverterContext};
use crate::context::TriggerKind;
use crate::transport::OptionValue;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

fn value(v: ArgumentValue) -> anyhow::Result<Conversion> {
    Ok(Conversion::Value(v))
}

fn no_value() -> anyhow::Result<Conversion> {
    Ok(Conversion::NoValue)
}

/// `true`/`false` and the informal spellings users actually type.
pub struct BoolConverter;

#[async_trait]
impl Converter for BoolConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        if let Some(OptionValue::Boolean(b)) = cx.current_option() {
            return value(ArgumentValue::Bool(*b));
        }
        let Some(token) = cx.next_token() else { return no_value() };
        match token.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" => value(ArgumentValue::Bool(true)),
            "false" | "no" | "n" | "off" | "0" => value(ArgumentValue::Bool(false)),
            _ => no_value(),
        }
    }
}

/// Fixed-width signed integers, range-checked against the declared width.
pub struct IntConverter {
    min: i64,
    max: i64,
}

impl IntConverter {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

#[async_trait]
impl Converter for IntConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let parsed = match cx.current_option() {
            Some(OptionValue::Integer(v)) => Some(*v),
            Some(_) => None,
            None => cx.next_token().and_then(|t| t.parse::<i64>().ok()),
        };
        match parsed {
            Some(v) if v >= self.min && v <= self.max => value(ArgumentValue::Int(v)),
            _ => no_value(),
        }
    }
}

/// Fixed-width unsigned integers.
pub struct UIntConverter {
    max: u64,
}

impl UIntConverter {
    pub fn new(max: u64) -> Self {
        Self { max }
    }
}

#[async_trait]
impl Converter for UIntConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let parsed = match cx.current_option() {
            Some(OptionValue::Integer(v)) => u64::try_from(*v).ok(),
            Some(_) => None,
            None => cx.next_token().and_then(|t| t.parse::<u64>().ok()),
        };
        match parsed {
            Some(v) if v <= self.max => value(ArgumentValue::UInt(v)),
            _ => no_value(),
        }
    }
}

/// `f32`/`f64` parameters; non-finite input is rejected.
pub struct FloatConverter {
    single: bool,
}

impl FloatConverter {
    pub fn single() -> Self {
        Self { single: true }
    }

    pub fn double() -> Self {
        Self { single: false }
    }
}

#[async_trait]
impl Converter for FloatConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let parsed = match cx.current_option() {
            Some(OptionValue::Number(v)) => Some(*v),
            Some(OptionValue::Integer(v)) => Some(*v as f64),
            Some(_) => None,
            None => cx.next_token().and_then(|t| t.parse::<f64>().ok()),
        };
        match parsed {
            Some(v) if v.is_finite() => {
                let v = if self.single { v as f32 as f64 } else { v };
                value(ArgumentValue::Float(v))
            }
            _ => no_value(),
        }
    }
}

/// Single token, or the remaining text when the parameter says so.
pub struct StringConverter;

#[async_trait]
impl Converter for StringConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        if let Some(OptionValue::String(s)) = cx.current_option() {
            return value(ArgumentValue::Str(s.clone()));
        }
        let remaining = cx.current_parameter().is_some_and(|p| p.remaining);
        let token = if remaining { cx.rest() } else { cx.next_token() };
        match token {
            Some(t) => value(ArgumentValue::Str(t)),
            None => no_value(),
        }
    }
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```(?:([A-Za-z0-9+._-]+)\n)?(.*?)```$").expect("fenced block pattern")
});

static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^`([^`]+)`$").expect("inline code pattern"));

/// Extracts a fenced (or inline) code block from the remaining text.
pub struct CodeBlockConverter;

#[async_trait]
impl Converter for CodeBlockConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let raw = match cx.current_option() {
            Some(OptionValue::String(s)) => Some(s.clone()),
            Some(_) => None,
            None => cx.rest(),
        };
        let Some(raw) = raw else { return no_value() };
        let raw = raw.trim();

        if let Some(caps) = FENCED_BLOCK.captures(raw) {
            let language = caps.get(1).map(|m| m.as_str().to_string());
            let code = caps.get(2).map_or("", |m| m.as_str()).trim_matches('\n').to_string();
            return value(ArgumentValue::CodeBlock { language, code });
        }
        if let Some(caps) = INLINE_CODE.captures(raw) {
            let code = caps.get(1).map_or("", |m| m.as_str()).to_string();
            return value(ArgumentValue::CodeBlock { language: None, code });
        }
        no_value()
    }
}

/// Colon form: `[d.]h:mm[:ss]`.
static COLON_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)\.)?(\d+):([0-5]?\d)(?::([0-5]?\d))?$").expect("colon duration pattern")
});

/// Unit-suffix form, right to left: each of y/mo/w/d/h/m/s/ms optional, order
/// fixed. A bare integer matches no unit and is rejected as ambiguous.
static UNIT_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(\d+)y)?(?:(\d+)mo)?(?:(\d+)w)?(?:(\d+)d)?(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?(?:(\d+)ms)?$",
    )
    .expect("unit duration pattern")
});

const UNIT_SECONDS: [u64; 7] = [
    365 * 86_400, // y
    30 * 86_400,  // mo
    7 * 86_400,   // w
    86_400,       // d
    3_600,        // h
    60,           // m
    1,            // s
];

/// Parse a duration token; `None` is the soft failure.
pub(crate) fn parse_duration(token: &str) -> Option<Duration> {
    if token == "0" {
        return Some(Duration::ZERO);
    }

    if let Some(caps) = COLON_DURATION.captures(token) {
        let days: u64 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        let hours: u64 = caps.get(2)?.as_str().parse().ok()?;
        let minutes: u64 = caps.get(3)?.as_str().parse().ok()?;
        let seconds: u64 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
        return Some(Duration::from_secs(
            days * 86_400 + hours * 3_600 + minutes * 60 + seconds,
        ));
    }

    let caps = UNIT_DURATION.captures(token)?;
    let mut total_ms: u64 = 0;
    let mut matched = false;
    for (i, scale) in UNIT_SECONDS.iter().enumerate() {
        if let Some(m) = caps.get(i + 1) {
            let n: u64 = m.as_str().parse().ok()?;
            total_ms = total_ms.checked_add(n.checked_mul(scale * 1_000)?)?;
            matched = true;
        }
    }
    if let Some(m) = caps.get(8) {
        let n: u64 = m.as_str().parse().ok()?;
        total_ms = total_ms.checked_add(n)?;
        matched = true;
    }
    if !matched {
        return None;
    }
    Some(Duration::from_millis(total_ms))
}

/// Durations in colon or unit-suffix form.
pub struct DurationConverter;

#[async_trait]
impl Converter for DurationConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let token = match cx.current_option() {
            Some(OptionValue::String(s)) => Some(s.clone()),
            Some(_) => None,
            None => cx.next_token(),
        };
        match token.as_deref().and_then(parse_duration) {
            Some(d) => value(ArgumentValue::Duration(d)),
            None => no_value(),
        }
    }
}

/// Enumeration parameters: name match for text, name-or-numeric for
/// interactions.
pub struct EnumConverter;

#[async_trait]
impl Converter for EnumConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let param = cx
            .current_parameter()
            .ok_or_else(|| anyhow::anyhow!("enum converter invoked without a current parameter"))?;
        let spec = param
            .enum_spec
            .clone()
            .ok_or_else(|| anyhow::anyhow!("parameter '{}' lacks an enum variant table", param.name))?;

        let matched = match cx.current_option() {
            Some(OptionValue::String(s)) => spec.by_name(s),
            Some(OptionValue::Integer(v)) if cx.trigger != TriggerKind::TextMessage => {
                spec.by_value(*v)
            }
            Some(_) => None,
            None => match cx.next_token() {
                Some(token) => spec.by_name(&token),
                None => None,
            },
        };
        match matched {
            Some((name, v)) => value(ArgumentValue::Choice { name: name.to_string(), value: v }),
            None => no_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_unit_form() {
        assert_eq!(
            parse_duration("1d2h30m"),
            Some(Duration::from_secs(86_400 + 2 * 3_600 + 30 * 60))
        );
        assert_eq!(parse_duration("1y"), Some(Duration::from_secs(365 * 86_400)));
        assert_eq!(parse_duration("2mo"), Some(Duration::from_secs(2 * 30 * 86_400)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("1w2d"), Some(Duration::from_secs(9 * 86_400)));
    }

    #[test]
    fn duration_zero_literal() {
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn duration_rejects_bare_integer() {
        assert_eq!(parse_duration("42"), None);
    }

    #[test]
    fn duration_rejects_out_of_order_units() {
        assert_eq!(parse_duration("30m2h"), None);
    }

    #[test]
    fn duration_colon_form() {
        assert_eq!(parse_duration("2:03"), Some(Duration::from_secs(2 * 3_600 + 3 * 60)));
        assert_eq!(
            parse_duration("1.02:03:04"),
            Some(Duration::from_secs(86_400 + 2 * 3_600 + 3 * 60 + 4))
        );
    }

    #[test]
    fn duration_case_insensitive_units() {
        assert_eq!(parse_duration("1D2H"), Some(Duration::from_secs(86_400 + 2 * 3_600)));
    }
}
