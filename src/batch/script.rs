//! Composite script generation.
//!
//! A sealed batch becomes one script for the run-many endpoint:
//!
//! ```text
//! var req1 = API.users.get({"user_ids":"1,2"});
//! var req2 = API.wall.get({"count":5,"owner_id":1});
//! return {"req1":req1,"req2":req2};
//! ```
//!
//! The credential parameter is never written into a per-call object; the whole script
//! runs under the credential attached to the run-many call itself.

use super::collector::SealedBatch;
use crate::types::params::{quote, script_literal};
use crate::types::Params;
use std::fmt::Write;

/// One call as seen by the encoder.
#[derive(Debug, Clone, Copy)]
pub struct ScriptCall<'a> {
    pub id: &'a str,
    pub method: &'a str,
    pub params: &'a Params,
}

/// Encode calls into a script. Output depends only on the input, in input order.
pub fn encode<'a, I>(calls: I, credential_param: &str) -> String
where
    I: IntoIterator<Item = ScriptCall<'a>>,
{
    let mut script = String::new();
    let mut ids = Vec::new();
    for call in calls {
        // Writing into a String cannot fail.
        let _ = writeln!(
            script,
            "var {} = API.{}({});",
            call.id,
            call.method,
            call_object(call.params, credential_param)
        );
        ids.push(call.id);
    }

    let returned: Vec<String> = ids
        .iter()
        .map(|id| format!("{}:{}", quote(id), id))
        .collect();
    let _ = write!(script, "return {{{}}};", returned.join(","));
    script
}

/// Encode every member of a sealed batch in id order.
pub fn encode_batch(batch: &SealedBatch, credential_param: &str) -> String {
    encode(
        batch.entries().iter().map(|(id, op)| ScriptCall {
            id: id.as_str(),
            method: op.method(),
            params: op.params(),
        }),
        credential_param,
    )
}

fn call_object(params: &Params, credential_param: &str) -> String {
    let fields: Vec<String> = params
        .iter()
        .filter(|(name, _)| name.as_str() != credential_param)
        .map(|(name, value)| format!("{}:{}", quote(name), script_literal(value)))
        .collect();
    format!("{{{}}}", fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::collector::OpenBatch;
    use crate::batch::pending::PendingOperation;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        serde_json::from_value(value).unwrap()
    }

    fn call<'a>(id: &'a str, method: &'a str, params: &'a Params) -> ScriptCall<'a> {
        ScriptCall { id, method, params }
    }

    #[test]
    fn test_encode_two_calls() {
        let a = params(json!({"x": 1}));
        let b = params(json!({"y": "s"}));
        let script = encode([call("req1", "A", &a), call("req2", "B", &b)], "access_token");
        assert_eq!(
            script,
            "var req1 = API.A({\"x\":1});\nvar req2 = API.B({\"y\":\"s\"});\nreturn {\"req1\":req1,\"req2\":req2};"
        );
    }

    #[test]
    fn test_encode_omits_credential() {
        let p = params(json!({"access_token": "secret", "user_ids": [1, 2], "extended": true}));
        let script = encode([call("req1", "users.get", &p)], "access_token");
        assert!(!script.contains("secret"));
        assert!(!script.contains("access_token"));
        assert!(script.contains(r#"API.users.get({"extended":1,"user_ids":[1,2]})"#));
    }

    #[test]
    fn test_encode_escapes_string_content() {
        let p = params(json!({"message": "\"});API.account.ban({"}));
        let script = encode([call("req1", "messages.send", &p)], "access_token");
        assert_eq!(
            script.lines().next().unwrap(),
            r#"var req1 = API.messages.send({"message":"\"});API.account.ban({"});"#
        );
    }

    #[test]
    fn test_encode_empty_params() {
        let p = Params::new();
        let script = encode([call("req1", "users.get", &p)], "access_token");
        assert_eq!(script, "var req1 = API.users.get({});\nreturn {\"req1\":req1};");
    }

    #[test]
    fn test_encode_batch_is_deterministic() {
        let mut batch = OpenBatch::new(25);
        batch.push(PendingOperation::new("friends.get", params(json!({"user_id": 1}))).0);
        batch.push(PendingOperation::new("groups.get", params(json!({"user_id": 2}))).0);
        let sealed = batch.seal();

        let first = encode_batch(&sealed, "access_token");
        let second = encode_batch(&sealed, "access_token");
        assert_eq!(first, second);
        assert!(first.starts_with("var req1 = API.friends.get("));
        assert!(first.ends_with("return {\"req1\":req1,\"req2\":req2};"));
    }
}
