use super::*;

/// A Stratum V1 JSON-RPC line. Stratum is not conformant JSON-RPC: incoming
/// messages are disambiguated by field presence rather than by a single
/// discriminant, per the wire spec: a message is a notification iff its
/// `method` is a non-empty string, and a response iff `id` is a nonzero
/// integer.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: u64,
        method: String,
        params: Value,
    },
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
    },
    Notification {
        method: String,
        params: Value,
    },
}

impl Message {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self::Request {
            id,
            method: method.into(),
            params,
        }
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            id: Option<u64>,
            method: Option<&'a str>,
            params: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            result: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a Value>,
        }

        let wire = match self {
            Message::Request { id, method, params } => Wire {
                id: Some(*id),
                method: Some(method),
                params: Some(params),
                result: None,
                error: None,
            },
            Message::Response { id, result, error } => Wire {
                id: Some(*id),
                method: None,
                params: None,
                result: result.as_ref(),
                error: error.as_ref(),
            },
            Message::Notification { method, params } => Wire {
                id: None,
                method: Some(method),
                params: Some(params),
                result: None,
                error: None,
            },
        };

        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            id: Option<Value>,
            #[serde(default)]
            method: Option<String>,
            #[serde(default)]
            params: Option<Value>,
            #[serde(default)]
            result: Option<Value>,
            #[serde(default)]
            error: Option<Value>,
        }

        let raw = Raw::deserialize(deserializer)?;

        if let Some(method) = raw.method.filter(|m| !m.is_empty()) {
            return Ok(Message::Notification {
                method,
                params: raw.params.unwrap_or(Value::Null),
            });
        }

        let id = raw
            .id
            .as_ref()
            .and_then(Value::as_u64)
            .filter(|id| *id != 0);

        if let Some(id) = id {
            return Ok(Message::Response {
                id,
                result: raw.result,
                error: raw.error,
            });
        }

        Err(de::Error::custom(
            "message is neither a notification (non-empty method) nor a response (nonzero id)",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_method_and_id() {
        let msg = Message::request(1, "mining.subscribe", serde_json::json!([]));
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"id": 1, "method": "mining.subscribe", "params": []})
        );
    }

    #[test]
    fn response_deserializes() {
        let json = r#"{"id":1,"result":[[["mining.notify","abc"]],"81000001",4],"error":null}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::Response { id, result, error } => {
                assert_eq!(id, 1);
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn notification_with_null_id_deserializes() {
        let json = r#"{"id":null,"method":"mining.notify","params":["jobA"]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::Notification { method, params } => {
                assert_eq!(method, "mining.notify");
                assert_eq!(params, serde_json::json!(["jobA"]));
            }
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn notification_method_wins_even_with_nonzero_id() {
        let json = r#"{"id":7,"method":"mining.set_difficulty","params":[1.5]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, Message::Notification { .. }));
    }

    #[test]
    fn reject_reason_rejection_is_still_a_response() {
        let json = r#"{"id":4,"result":null,"error":[23,"Invalid nonce",null]}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        match msg {
            Message::Response { id, result, error } => {
                assert_eq!(id, 4);
                assert!(result.is_none());
                assert!(error.is_some());
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn garbage_message_is_rejected() {
        let json = r#"{"foo":"bar"}"#;
        assert!(serde_json::from_str::<Message>(json).is_err());
    }
}
