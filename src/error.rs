//! Unified application error model.
//!
//! One `AppError` variant per error kind named in the design (protocol,
//! command, graph-transaction, media, descriptor, storage, fatal). Every
//! variant carries a `code`/`message` pair; `errno` is populated only for
//! storage errors that originate from a raw OS error.
//!
//! Wire-level status codes (`Success | Empty | Exists | Error | NotUnique`)
//! live separately in `crate::graph::adapter::Status`; an `AppError` always
//! maps to `Status::Error` on the wire, since `Exists`/`Empty` are not
//! errors at all.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppError {
    Protocol { code: String, message: String },
    Command { code: String, message: String },
    Graph { code: String, message: String },
    Media { code: String, message: String },
    Descriptor { code: String, message: String },
    Storage { code: String, message: String, errno: Option<i32> },
    Fatal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Protocol { code, .. }
            | AppError::Command { code, .. }
            | AppError::Graph { code, .. }
            | AppError::Media { code, .. }
            | AppError::Descriptor { code, .. }
            | AppError::Storage { code, .. }
            | AppError::Fatal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Protocol { message, .. }
            | AppError::Command { message, .. }
            | AppError::Graph { message, .. }
            | AppError::Media { message, .. }
            | AppError::Descriptor { message, .. }
            | AppError::Storage { message, .. }
            | AppError::Fatal { message, .. } => message.as_str(),
        }
    }

    pub fn protocol<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Protocol { code: code.into(), message: msg.into() }
    }
    pub fn command<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Command { code: code.into(), message: msg.into() }
    }
    pub fn graph<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Graph { code: code.into(), message: msg.into() }
    }
    pub fn media<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Media { code: code.into(), message: msg.into() }
    }
    pub fn descriptor<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Descriptor { code: code.into(), message: msg.into() }
    }
    pub fn storage<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Storage { code: code.into(), message: msg.into(), errno: None }
    }
    pub fn storage_errno<C: Into<String>, M: Into<String>>(code: C, msg: M, errno: i32) -> Self {
        AppError::Storage { code: code.into(), message: msg.into(), errno: Some(errno) }
    }
    pub fn fatal<C: Into<String>, M: Into<String>>(code: C, msg: M) -> Self {
        AppError::Fatal { code: code.into(), message: msg.into() }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(err) => AppError::Fatal { code: "internal_error".into(), message: err.to_string() },
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            code: "io_error".into(),
            message: err.to_string(),
            errno: err.raw_os_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_message_roundtrip() {
        let e = AppError::descriptor("dimension_mismatch", "expected dim 128, got 64");
        assert_eq!(e.code_str(), "dimension_mismatch");
        assert_eq!(e.message(), "expected dim 128, got 64");
    }

    #[test]
    fn io_error_carries_errno() {
        let io_err = std::io::Error::from_raw_os_error(2);
        let app: AppError = io_err.into();
        match app {
            AppError::Storage { errno, .. } => assert_eq!(errno, Some(2)),
            _ => panic!("expected Storage variant"),
        }
    }

    #[test]
    fn serde_tag_is_kind() {
        let e = AppError::media("bad_format", "unsupported codec");
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["kind"], "media");
        assert_eq!(v["code"], "bad_format");
    }
}
