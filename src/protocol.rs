//! Wire protocol codec for `grb/1`.
//!
//! The wire is newline-delimited JSON over loopback TCP. Each request line
//! is an object `{id, proto?, cmd, args?, token?}`; each response line is
//! either `{id, ok: true, ...data}` with the payload flattened into the
//! envelope, or `{id, ok: false, error: {code, message, ...extra}}`.
//!
//! Parsing happens on the I/O thread; parse failures are still dispatched so
//! a response carrying the best-effort `id` (empty when unrecoverable) can
//! be emitted. Framing is guarded by a 10 MiB cap on the unconsumed read
//! buffer, a malformed-client safety valve rather than a protocol limit.

use serde_json::{json, Map, Value};

/// Protocol literal expected in the optional `proto` request field.
pub const PROTO_VERSION: &str = "grb/1";

/// Upper bound on buffered bytes without a line terminator. Crossing it
/// drops the connection.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Closed set of error codes carried in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadJson,
    BadProto,
    UnknownCmd,
    BadToken,
    TierDenied,
    DangerDisabled,
    BadArgs,
    NotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadJson => "bad_json",
            ErrorCode::BadProto => "bad_proto",
            ErrorCode::UnknownCmd => "unknown_cmd",
            ErrorCode::BadToken => "bad_token",
            ErrorCode::TierDenied => "tier_denied",
            ErrorCode::DangerDisabled => "danger_disabled",
            ErrorCode::BadArgs => "bad_args",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// A validated request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Opaque client correlation key, echoed verbatim on the response.
    pub id: String,
    pub cmd: String,
    pub args: Map<String, Value>,
    pub token: String,
}

/// A request line that failed validation, with the best-effort `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub id: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Outcome of parsing one wire line.
pub type ParsedLine = Result<Request, ParseFailure>;

/// Parse a single request line (no embedded newline).
///
/// Failure taxonomy: anything that is not a JSON object is `bad_json`; a
/// missing or empty `cmd` is `bad_json`; a `proto` field present but not
/// equal to [`PROTO_VERSION`] is `bad_proto`. An `args` field that is not an
/// object is coerced to empty; `token` defaults to empty. Unknown fields are
/// ignored.
pub fn parse_line(line: &str) -> ParsedLine {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(err) => {
            return Err(ParseFailure {
                id: String::new(),
                code: ErrorCode::BadJson,
                message: format!("invalid JSON: {err}"),
            });
        }
    };

    let obj = match value.as_object() {
        Some(obj) => obj,
        None => {
            return Err(ParseFailure {
                id: String::new(),
                code: ErrorCode::BadJson,
                message: "request must be a JSON object".to_string(),
            });
        }
    };

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(proto) = obj.get("proto") {
        if proto.as_str() != Some(PROTO_VERSION) {
            return Err(ParseFailure {
                id,
                code: ErrorCode::BadProto,
                message: format!("unsupported protocol, expected {PROTO_VERSION:?}"),
            });
        }
    }

    let cmd = match obj.get("cmd").and_then(Value::as_str) {
        Some(cmd) if !cmd.is_empty() => cmd.to_string(),
        _ => {
            return Err(ParseFailure {
                id,
                code: ErrorCode::BadJson,
                message: "missing or empty cmd".to_string(),
            });
        }
    };

    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let token = obj
        .get("token")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Request {
        id,
        cmd,
        args,
        token,
    })
}

/// Build a success response. `data` must be a JSON object; its fields are
/// flattened into the envelope rather than nested.
pub fn ok(id: &str, data: Value) -> Value {
    let mut envelope = Map::new();
    envelope.insert("id".to_string(), Value::String(id.to_string()));
    envelope.insert("ok".to_string(), Value::Bool(true));
    if let Value::Object(fields) = data {
        for (key, value) in fields {
            envelope.insert(key, value);
        }
    }
    Value::Object(envelope)
}

/// Build an error response with optional extra fields merged into the
/// `error` object.
pub fn error(id: &str, code: ErrorCode, message: &str, extra: Option<Value>) -> Value {
    let mut body = Map::new();
    body.insert("code".to_string(), Value::String(code.as_str().to_string()));
    body.insert("message".to_string(), Value::String(message.to_string()));
    if let Some(Value::Object(fields)) = extra {
        for (key, value) in fields {
            body.insert(key, value);
        }
    }
    json!({ "id": id, "ok": false, "error": body })
}

/// Serialize a response envelope as one wire line, newline-terminated.
pub fn encode_line(response: &Value) -> String {
    let mut line = response.to_string();
    line.push('\n');
    line
}

/// Signalled when a client exceeds [`MAX_LINE_BYTES`] without sending a
/// terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOverflow;

/// Incremental splitter for the newline-delimited wire.
///
/// Accumulates partial reads, yields complete lines, skips empty ones and
/// enforces the buffer cap. [`reset`](LineSplitter::reset) discards state
/// when the connection is replaced.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and split off any complete lines.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, FrameOverflow> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }

        if self.buf.len() > MAX_LINE_BYTES {
            self.buf.clear();
            return Err(FrameOverflow);
        }
        Ok(lines)
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_request() {
        let req = parse_line(r#"{"id":"a","cmd":"ping"}"#).unwrap();
        assert_eq!(req.id, "a");
        assert_eq!(req.cmd, "ping");
        assert!(req.args.is_empty());
        assert!(req.token.is_empty());
    }

    #[test]
    fn test_parse_full_request() {
        let req = parse_line(
            r#"{"id":"x","proto":"grb/1","cmd":"click","args":{"x":1,"y":2},"token":"t"}"#,
        )
        .unwrap();
        assert_eq!(req.cmd, "click");
        assert_eq!(req.args.get("x"), Some(&json!(1)));
        assert_eq!(req.token, "t");
    }

    #[test]
    fn test_parse_not_json() {
        let failure = parse_line("not json").unwrap_err();
        assert_eq!(failure.code, ErrorCode::BadJson);
        assert_eq!(failure.id, "");
    }

    #[test]
    fn test_parse_non_object() {
        let failure = parse_line("[1,2,3]").unwrap_err();
        assert_eq!(failure.code, ErrorCode::BadJson);
        assert_eq!(failure.id, "");
    }

    #[test]
    fn test_parse_missing_cmd_recovers_id() {
        let failure = parse_line(r#"{"id":"q"}"#).unwrap_err();
        assert_eq!(failure.code, ErrorCode::BadJson);
        assert_eq!(failure.id, "q");
    }

    #[test]
    fn test_parse_bad_proto() {
        let failure = parse_line(r#"{"id":"p","proto":"grb/2","cmd":"ping"}"#).unwrap_err();
        assert_eq!(failure.code, ErrorCode::BadProto);
        assert_eq!(failure.id, "p");
    }

    #[test]
    fn test_parse_args_coerced_to_empty() {
        let req = parse_line(r#"{"id":"a","cmd":"ping","args":[1,2]}"#).unwrap();
        assert!(req.args.is_empty());
    }

    #[test]
    fn test_parse_unknown_fields_ignored() {
        let req = parse_line(r#"{"id":"a","cmd":"ping","whatever":true}"#).unwrap();
        assert_eq!(req.cmd, "ping");
    }

    #[test]
    fn test_ok_flattens_data() {
        let resp = ok("a", json!({"pong": true}));
        assert_eq!(resp, json!({"id": "a", "ok": true, "pong": true}));
    }

    #[test]
    fn test_error_with_extra() {
        let resp = error(
            "b",
            ErrorCode::TierDenied,
            "tier 2 required",
            Some(json!({"tier_required": 2})),
        );
        assert_eq!(resp["ok"], json!(false));
        assert_eq!(resp["error"]["code"], json!("tier_denied"));
        assert_eq!(resp["error"]["tier_required"], json!(2));
    }

    #[test]
    fn test_response_roundtrip() {
        let resp = ok("r", json!({"width": 640, "height": 480}));
        let line = encode_line(&resp);
        assert!(line.ends_with('\n'));
        let reparsed: Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(reparsed, resp);
    }

    #[test]
    fn test_splitter_partial_reads() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"{\"id\":").unwrap(), Vec::<String>::new());
        let lines = splitter.push(b"\"a\"}\n{\"id\":\"b\"}\n").unwrap();
        assert_eq!(lines, vec![r#"{"id":"a"}"#, r#"{"id":"b"}"#]);
        assert_eq!(splitter.buffered(), 0);
    }

    #[test]
    fn test_splitter_skips_empty_lines() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"\n\r\n  \nx\n").unwrap();
        assert_eq!(lines, vec!["x"]);
    }

    #[test]
    fn test_splitter_strips_carriage_return() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(b"{\"id\":\"a\"}\r\n").unwrap();
        assert_eq!(lines, vec![r#"{"id":"a"}"#]);
    }

    #[test]
    fn test_splitter_overflow() {
        let mut splitter = LineSplitter::new();
        let chunk = vec![b'x'; MAX_LINE_BYTES + 1];
        assert_eq!(splitter.push(&chunk), Err(FrameOverflow));
        // The splitter is reusable after the overflow is handled.
        assert_eq!(splitter.push(b"ok\n").unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_splitter_reset() {
        let mut splitter = LineSplitter::new();
        splitter.push(b"partial").unwrap();
        splitter.reset();
        assert_eq!(splitter.push(b" line\n").unwrap(), vec!["line"]);
    }
}
