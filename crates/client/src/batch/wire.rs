//! JSON shapes of the batched wire call.
//!
//! Request body: `[{"id": 1, "procedure": "cart.get", "input": {...}}, ...]`
//!
//! Response elements are either `{"id": 1, "result": {"data": ...}}` or
//! `{"id": 1, "error": {"message": "..."}}`, in any order.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::BatchError;

/// One logical call inside a physical batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCall {
    pub id: u64,
    pub procedure: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyData {
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyError {
    pub message: String,
}

/// One element of the batch response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchReply {
    Error { id: u64, error: ReplyError },
    Ok { id: u64, result: ReplyData },
}

impl BatchReply {
    pub fn ok(id: u64, data: Value) -> Self {
        BatchReply::Ok { id, result: ReplyData { data } }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        BatchReply::Error { id, error: ReplyError { message: message.into() } }
    }

    pub fn id(&self) -> u64 {
        match self {
            BatchReply::Error { id, .. } | BatchReply::Ok { id, .. } => *id,
        }
    }

    pub fn into_result(self) -> Result<Value, BatchError> {
        match self {
            BatchReply::Ok { result, .. } => Ok(result.data),
            BatchReply::Error { error, .. } => Err(BatchError::Item(error.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_serializes_as_wire_shape() {
        let call = BatchCall { id: 3, procedure: "cart.get".into(), input: json!({"user": 9}) };
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"id": 3, "procedure": "cart.get", "input": {"user": 9}})
        );
    }

    #[test]
    fn test_reply_variants() {
        let ok: BatchReply = serde_json::from_value(json!({"id": 1, "result": {"data": [1, 2]}})).unwrap();
        assert_eq!(ok.id(), 1);
        assert_eq!(ok.into_result(), Ok(json!([1, 2])));

        let err: BatchReply = serde_json::from_value(json!({"id": 2, "error": {"message": "denied"}})).unwrap();
        assert_eq!(err.id(), 2);
        assert_eq!(err.into_result(), Err(BatchError::Item("denied".into())));
    }

    #[test]
    fn test_result_without_data_is_null() {
        let reply: BatchReply = serde_json::from_value(json!({"id": 5, "result": {}})).unwrap();
        assert_eq!(reply.into_result(), Ok(Value::Null));
    }

    #[test]
    fn test_element_without_id_rejected() {
        assert!(serde_json::from_value::<BatchReply>(json!({"result": {"data": 1}})).is_err());
    }
}
