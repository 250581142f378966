//! Inner chat payload and local history entries.
//!
//! What a client encrypts into each envelope is a small JSON document:
//!
//! ```json
//! {"from": "ann", "text": "hi", "ts": 1700000000000,
//!  "replyTo": {"from": "bob", "text": "hello?", "ts": 1699999990000}}
//! ```
//!
//! Sender names only ever travel inside the ciphertext.

use serde::{Deserialize, Serialize};

/// Sender shown for a plaintext that is not a chat payload.
pub const UNKNOWN_SENDER: &str = "?";

/// Quoted message a chat replies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    /// Quoted sender.
    pub from: String,
    /// Quoted text.
    pub text: String,
    /// Quoted timestamp (unix milliseconds).
    pub ts: u64,
}

/// Decrypted chat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatBody {
    /// Self-declared sender name. Not authenticated.
    pub from: String,
    /// Message text.
    pub text: String,
    /// Sender's clock (unix milliseconds).
    pub ts: u64,
    /// Quoted message, if this is a reply.
    #[serde(rename = "replyTo", default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
}

/// Lenient view of a payload: every field optional.
#[derive(Deserialize)]
struct LooseBody {
    from: Option<String>,
    text: Option<String>,
    ts: Option<u64>,
    #[serde(rename = "replyTo")]
    reply_to: Option<serde_json::Value>,
}

/// A quote needs a sender and a text; anything else about it is optional.
fn loose_quote(value: &serde_json::Value) -> Option<ReplyTo> {
    let from = value.get("from")?.as_str()?;
    let text = value.get("text")?.as_str()?;
    let ts = value.get("ts").and_then(serde_json::Value::as_u64).unwrap_or_default();
    Some(ReplyTo { from: from.to_string(), text: text.to_string(), ts })
}

impl ChatBody {
    /// Interpret a decrypted plaintext.
    ///
    /// A JSON object with missing fields is filled in (`from` becomes `"?"`,
    /// `ts` becomes `received_at`) and a quote without a sender or text is
    /// dropped. Anything else is shown verbatim as text from `"?"`.
    pub fn from_plaintext(plaintext: &[u8], received_at: u64) -> Self {
        match serde_json::from_slice::<LooseBody>(plaintext) {
            Ok(body) => Self {
                from: body.from.filter(|f| !f.is_empty()).unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
                text: body.text.unwrap_or_default(),
                ts: body.ts.filter(|ts| *ts != 0).unwrap_or(received_at),
                reply_to: body.reply_to.as_ref().and_then(loose_quote),
            },
            Err(_) => Self {
                from: UNKNOWN_SENDER.to_string(),
                text: String::from_utf8_lossy(plaintext).into_owned(),
                ts: received_at,
                reply_to: None,
            },
        }
    }

    /// Quote of this message for a reply.
    pub fn quote(&self) -> ReplyTo {
        ReplyTo { from: self.from.clone(), text: self.text.clone(), ts: self.ts }
    }
}

/// One line of a room's local history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEntry {
    /// A chat message.
    Chat {
        /// Decrypted payload.
        body: ChatBody,
        /// Whether this client sent it.
        own: bool,
    },
    /// A notice about the room itself.
    System {
        /// Human-readable notice.
        text: String,
        /// When it happened (unix milliseconds).
        ts: u64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_reply_as_camel_case() {
        let body = ChatBody {
            from: "ann".into(),
            text: "yes".into(),
            ts: 2,
            reply_to: Some(ReplyTo { from: "bob".into(), text: "ok?".into(), ts: 1 }),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"replyTo\":{"));
    }

    #[test]
    fn omits_missing_reply() {
        let body = ChatBody { from: "ann".into(), text: "hi".into(), ts: 1, reply_to: None };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("replyTo"));
    }

    #[test]
    fn parses_payload_from_other_clients() {
        let body = ChatBody::from_plaintext(
            br#"{"from":"bob","text":"hi","ts":5,"replyTo":{"from":"ann","text":"yo","ts":4}}"#,
            99,
        );
        assert_eq!(body.from, "bob");
        assert_eq!(body.ts, 5);
        assert_eq!(body.reply_to.map(|r| r.from), Some("ann".to_string()));
    }

    #[test]
    fn fills_missing_fields() {
        let body = ChatBody::from_plaintext(br#"{"text":"hi"}"#, 99);
        assert_eq!(body.from, UNKNOWN_SENDER);
        assert_eq!(body.ts, 99);
    }

    #[test]
    fn incomplete_quote_keeps_the_message() {
        let body = ChatBody::from_plaintext(br#"{"from":"bob","text":"yes","ts":5,"replyTo":{"from":"ann","text":"ok?"}}"#, 9);
        assert_eq!(body.text, "yes");
        assert_eq!(body.reply_to, Some(ReplyTo { from: "ann".into(), text: "ok?".into(), ts: 0 }));

        let body = ChatBody::from_plaintext(br#"{"from":"bob","text":"yes","ts":5,"replyTo":{"ts":"soon"}}"#, 9);
        assert_eq!(body.from, "bob");
        assert_eq!(body.reply_to, None);

        let body = ChatBody::from_plaintext(br#"{"from":"bob","text":"yes","replyTo":"nope"}"#, 9);
        assert_eq!(body.text, "yes");
        assert_eq!(body.reply_to, None);
    }

    #[test]
    fn non_json_plaintext_is_shown_verbatim() {
        let body = ChatBody::from_plaintext(b"plain old text", 7);
        assert_eq!(body, ChatBody {
            from: UNKNOWN_SENDER.into(),
            text: "plain old text".into(),
            ts: 7,
            reply_to: None
        });
    }

    proptest::proptest! {
        #[test]
        fn any_plaintext_yields_a_body(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256)) {
            let body = ChatBody::from_plaintext(&bytes, 42);
            proptest::prop_assert!(!body.from.is_empty());
        }

        #[test]
        fn sent_bodies_read_back_unchanged(from in "[a-z]{1,12}", text in "\\PC{0,64}", ts in 1u64..) {
            let body = ChatBody { from, text, ts, reply_to: None };
            let json = serde_json::to_vec(&body).unwrap();
            proptest::prop_assert_eq!(ChatBody::from_plaintext(&json, 0), body);
        }
    }
}
