//! Parser for job invocation targets such as `maintenance.purgeAdminLogs(30L)`.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum InvokeArg {
    Str(String),
    Bool(bool),
    Long(i64),
    Double(f64),
    Integer(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    Str,
    Bool,
    Long,
    Double,
    Integer,
}

impl InvokeArg {
    pub fn arg_type(&self) -> ArgType {
        match self {
            Self::Str(_) => ArgType::Str,
            Self::Bool(_) => ArgType::Bool,
            Self::Long(_) => ArgType::Long,
            Self::Double(_) => ArgType::Double,
            Self::Integer(_) => ArgType::Integer,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Str(value) => Value::from(value.as_str()),
            Self::Bool(value) => Value::from(*value),
            Self::Long(value) => Value::from(*value),
            Self::Double(value) => Value::from(*value),
            Self::Integer(value) => Value::from(*value),
        }
    }

    /// Integral value of a `Long` or `Integer` argument.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(value) => Some(*value),
            Self::Integer(value) => Some(i64::from(*value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("invalid argument `{0}`")]
    InvalidArgument(String),
    #[error("no job target registered as `{0}`")]
    UnknownBean(String),
    #[error("`{bean}` has no method `{method}`")]
    UnknownMethod { bean: String, method: String },
    #[error("malformed invoke target `{0}`")]
    Malformed(String),
    #[error("job target failed: {0}")]
    Failed(String),
}

/// A fully parsed invocation target.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub bean: String,
    pub method: String,
    pub args: Vec<InvokeArg>,
}

impl Invocation {
    pub fn parse(target: &str) -> Result<Self, InvokeError> {
        let target = target.trim();
        let malformed = || InvokeError::Malformed(target.to_string());
        if !target.contains('(') || !target.ends_with(')') {
            return Err(malformed());
        }

        let bean = bean_name(target);
        let method = method_name(target);
        if bean.is_empty() || method.is_empty() || bean == head(target) {
            return Err(malformed());
        }

        Ok(Self {
            bean: bean.to_string(),
            method: method.to_string(),
            args: method_params(target)?.unwrap_or_default(),
        })
    }
}

fn head(target: &str) -> &str {
    target.split_once('(').map_or(target, |(head, _)| head)
}

/// Fully-qualified targets carry more than one `.` before the argument list.
pub fn is_valid_class_name(target: &str) -> bool {
    head(target).matches('.').count() > 1
}

pub fn bean_name(target: &str) -> &str {
    let head = head(target);
    head.rsplit_once('.').map_or(head, |(bean, _)| bean)
}

pub fn method_name(target: &str) -> &str {
    head(target)
        .rsplit_once('.')
        .map_or("", |(_, method)| method)
}

/// Typed arguments, or `None` when the parentheses are empty.
pub fn method_params(target: &str) -> Result<Option<Vec<InvokeArg>>, InvokeError> {
    let Some((_, rest)) = target.split_once('(') else {
        return Ok(None);
    };
    let inner = rest.rsplit_once(')').map_or(rest, |(inner, _)| inner);
    if inner.trim().is_empty() {
        return Ok(None);
    }

    split_outside_quotes(inner)
        .into_iter()
        .map(|raw| parse_arg(raw.trim()))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn params_types(args: &[InvokeArg]) -> Vec<ArgType> {
    args.iter().map(InvokeArg::arg_type).collect()
}

pub fn params_values(args: &[InvokeArg]) -> Vec<Value> {
    args.iter().map(InvokeArg::to_value).collect()
}

fn split_outside_quotes(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in inner.char_indices() {
        match (quote, ch) {
            (Some(open), c) if c == open => quote = None,
            (None, '\'' | '"') => quote = Some(ch),
            (None, ',') => {
                parts.push(&inner[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn parse_arg(raw: &str) -> Result<InvokeArg, InvokeError> {
    let invalid = || InvokeError::InvalidArgument(raw.to_string());
    if raw.is_empty() {
        return Err(invalid());
    }

    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Ok(InvokeArg::Str(raw[1..raw.len() - 1].to_string()));
        }
    }

    if raw.eq_ignore_ascii_case("true") {
        return Ok(InvokeArg::Bool(true));
    }
    if raw.eq_ignore_ascii_case("false") {
        return Ok(InvokeArg::Bool(false));
    }

    if let Some(number) = raw.strip_suffix(['L', 'l']) {
        return number.trim().parse().map(InvokeArg::Long).map_err(|_| invalid());
    }
    if let Some(number) = raw.strip_suffix(['D', 'd']) {
        return number
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(InvokeArg::Double)
            .ok_or_else(invalid);
    }
    raw.parse().map(InvokeArg::Integer).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn class_names_need_a_package() {
        assert!(is_valid_class_name("com.example.TestService.testMethod()"));
        assert!(!is_valid_class_name("testService.testMethod()"));
        assert!(!is_valid_class_name("testMethod()"));
        assert!(!is_valid_class_name("svc.m('a.b.c')"));
    }

    #[test]
    fn bean_and_method_split_on_last_dot() {
        assert_eq!(bean_name("testService.testMethod('param1', 123)"), "testService");
        assert_eq!(bean_name("com.x.Svc.m()"), "com.x.Svc");
        assert_eq!(method_name("com.x.Svc.m()"), "m");
        assert_eq!(method_name("testService.testMethod('param1', 123)"), "testMethod");
    }

    #[test]
    fn empty_parentheses_mean_no_params() {
        assert_eq!(method_params("testService.testMethod()"), Ok(None));
        assert_eq!(method_params("testService.testMethod(  )"), Ok(None));
    }

    #[test]
    fn arguments_are_typed() {
        let args = method_params("svc.m('param1', 123, true, 456L, 1.5D, \"two\")")
            .expect("parse")
            .expect("args");
        assert_eq!(
            args,
            vec![
                InvokeArg::Str("param1".into()),
                InvokeArg::Integer(123),
                InvokeArg::Bool(true),
                InvokeArg::Long(456),
                InvokeArg::Double(1.5),
                InvokeArg::Str("two".into()),
            ]
        );
        assert_eq!(
            params_types(&args),
            vec![
                ArgType::Str,
                ArgType::Integer,
                ArgType::Bool,
                ArgType::Long,
                ArgType::Double,
                ArgType::Str,
            ]
        );
        assert_eq!(
            params_values(&args),
            vec![json!("param1"), json!(123), json!(true), json!(456), json!(1.5), json!("two")]
        );
    }

    #[test]
    fn doubles_must_be_finite() {
        for raw in ["NaND", "infD", "-infd", "1e400D"] {
            assert_eq!(
                method_params(&format!("svc.m({raw})")),
                Err(InvokeError::InvalidArgument(raw.into())),
                "{raw}"
            );
        }
        assert_eq!(
            method_params("svc.m(-2.5d)"),
            Ok(Some(vec![InvokeArg::Double(-2.5)]))
        );
    }

    #[test]
    fn commas_inside_quotes_do_not_split() {
        assert_eq!(
            method_params("svc.m('param1,param2')"),
            Ok(Some(vec![InvokeArg::Str("param1,param2".into())]))
        );
        assert_eq!(
            method_params("svc.m(\"a, b\", 'c')"),
            Ok(Some(vec![
                InvokeArg::Str("a, b".into()),
                InvokeArg::Str("c".into())
            ]))
        );
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        assert_eq!(
            method_params("svc.m(12x)"),
            Err(InvokeError::InvalidArgument("12x".into()))
        );
        assert_eq!(
            method_params("svc.m(abcL)"),
            Err(InvokeError::InvalidArgument("abcL".into()))
        );
        assert!(method_params("svc.m(1,)").is_err());
    }

    #[test]
    fn invocation_requires_bean_method_and_parentheses() {
        let parsed = Invocation::parse("maintenance.purgeAdminLogs(30L)").expect("parse");
        assert_eq!(parsed.bean, "maintenance");
        assert_eq!(parsed.method, "purgeAdminLogs");
        assert_eq!(parsed.args, vec![InvokeArg::Long(30)]);

        for bad in ["maintenance.ping", "ping()", ".ping()", "maintenance.()"] {
            assert!(
                matches!(Invocation::parse(bad), Err(InvokeError::Malformed(_))),
                "{bad}"
            );
        }
    }
}
