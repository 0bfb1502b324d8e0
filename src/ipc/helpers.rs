use crate::error::{ExamError, ExamResult};
use crate::ipc::types::Request;

pub fn str_param<'a>(req: &'a Request, key: &str) -> ExamResult<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExamError::validation(format!("missing {key}")))
}

pub fn opt_str_param<'a>(req: &'a Request, key: &str) -> Option<&'a str> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn i64_param(req: &Request, key: &str) -> ExamResult<i64> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExamError::validation(format!("missing/invalid {key}")))
}
