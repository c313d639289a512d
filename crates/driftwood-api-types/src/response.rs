use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Business result codes carried in the `code` field of every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    Failure,
}

impl ResultCode {
    pub const fn code(self) -> i32 {
        match self {
            Self::Success => 200,
            Self::Failure => 400,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "operation succeeded",
            Self::Failure => "operation failed",
        }
    }
}

/// Uniform success/failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult<T = Value> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl<T> ResponseResult<T> {
    fn build(code: i32, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
            extra: Map::new(),
        }
    }

    pub fn success() -> Self {
        Self::build(
            ResultCode::Success.code(),
            ResultCode::Success.description(),
            None,
        )
    }

    pub fn success_with(data: T) -> Self {
        Self::build(
            ResultCode::Success.code(),
            ResultCode::Success.description(),
            Some(data),
        )
    }

    pub fn success_message(message: impl Into<String>, data: T) -> Self {
        Self::build(ResultCode::Success.code(), message, Some(data))
    }

    pub fn success_code(code: i32, message: impl Into<String>, data: T) -> Self {
        Self::build(code, message, Some(data))
    }

    pub fn success_code_message(code: i32, message: impl Into<String>) -> Self {
        Self::build(code, message, None)
    }

    pub fn error() -> Self {
        Self::build(
            ResultCode::Failure.code(),
            ResultCode::Failure.description(),
            None,
        )
    }

    pub fn error_message(message: impl Into<String>) -> Self {
        Self::build(ResultCode::Failure.code(), message, None)
    }

    pub fn error_code(code: i32, message: impl Into<String>) -> Self {
        Self::build(code, message, None)
    }

    /// Insert (or replace) an extra attribute. `Value::Null` is kept as-is.
    pub fn put_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success.code()
    }
}
