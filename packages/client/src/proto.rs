//! Wire protocol between the coordinator and a worker.
//!
//! One JSON object per text frame. The coordinator sends `invoke` frames;
//! the worker answers each accepted invoke with exactly one `result` frame
//! carrying the same `request_id`. Request ids are coordinator-assigned
//! opaque strings; the worker never generates or reuses them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsValue;

/// A frame on the coordinator channel.
///
/// Expected incoming message:
///
/// ```json
/// {
///   "type": "invoke",
///   "request_id": "2ea49337-4531-4e67-a86e-93f464c8d424",
///   "name": "echo3",
///   "uri": "assets/echo3_3724494060.wasm",
///   "signature": {
///     "params": [],
///     "shim_idx": 0,
///     "ret": { "type": "vector", "content": { "type": "u8" } },
///     "inner_ret": { "type": "vector", "content": { "type": "u8" } }
///   },
///   "args": []
/// }
/// ```
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Invoke {
        request_id: String,
        name: String,
        uri: String,
        signature: CallSignature,
        args: Vec<JsValue>,
    },
    Result {
        request_id: String,
        content: JsValue,
    },
}

impl WireMessage {
    pub fn result(request_id: String, content: JsValue) -> Self {
        Self::Result {
            request_id,
            content,
        }
    }

    pub fn from_json(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Call signature of a deployed function, as described by the module's
/// embedded wasm-bindgen descriptor.
///
/// Opaque to the connection layer; the execution backend interprets it.
/// `shim_idx` selects the calling-convention shim inside the module,
/// `inner_ret` is the module-native encoding of the return value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSignature {
    pub params: Vec<TypeDesc>,
    pub shim_idx: u8,
    pub ret: TypeDesc,
    pub inner_ret: Option<TypeDesc>,
}

/// Type descriptor in a [`CallSignature`].
///
/// Mirrors the coordinator's descriptor encoding; variant order matters only
/// on the wire's `type` string, not numerically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "content")]
pub enum TypeDesc {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Boolean,
    Function(Box<CallSignature>),
    CachedString,
    String,
    Ref(Box<TypeDesc>),
    RefMut(Box<TypeDesc>),
    Slice(Box<TypeDesc>),
    Vector(Box<TypeDesc>),
    Externref,
    NamedExternref,
    Enum,
    RustStruct,
    Char,
    Option(Box<TypeDesc>),
    Result,
    Unit,
    ClampedU8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_invoke_frame() {
        let frame = json!({
            "type": "invoke",
            "request_id": "r1",
            "name": "echo",
            "uri": "assets/echo.wasm",
            "signature": {
                "params": [{"type": "i32"}, {"type": "i32"}],
                "shim_idx": 0,
                "ret": {"type": "i32"},
                "inner_ret": {"type": "i32"}
            },
            "args": [1, 2]
        })
        .to_string();

        let msg = WireMessage::from_json(&frame).unwrap();
        match msg {
            WireMessage::Invoke {
                request_id,
                name,
                uri,
                signature,
                args,
            } => {
                assert_eq!(request_id, "r1");
                assert_eq!(name, "echo");
                assert_eq!(uri, "assets/echo.wasm");
                assert_eq!(signature.params, vec![TypeDesc::I32, TypeDesc::I32]);
                assert_eq!(signature.ret, TypeDesc::I32);
                assert_eq!(args, vec![json!(1), json!(2)]);
            }
            other => panic!("expected invoke, got {:?}", other),
        }
    }

    #[test]
    fn decodes_nested_type_descriptors() {
        let frame = json!({
            "type": "invoke",
            "request_id": "r2",
            "name": "concat",
            "uri": "assets/concat.wasm",
            "signature": {
                "params": [{"type": "vector", "content": {"type": "u8"}}],
                "shim_idx": 1,
                "ret": {"type": "option", "content": {"type": "string"}},
                "inner_ret": null
            },
            "args": [[1, 2, 3]]
        })
        .to_string();

        let msg = WireMessage::from_json(&frame).unwrap();
        let WireMessage::Invoke { signature, .. } = msg else {
            panic!("expected invoke");
        };
        assert_eq!(
            signature.params,
            vec![TypeDesc::Vector(Box::new(TypeDesc::U8))]
        );
        assert_eq!(
            signature.ret,
            TypeDesc::Option(Box::new(TypeDesc::String))
        );
        assert_eq!(signature.inner_ret, None);
    }

    #[test]
    fn encodes_result_frame() {
        let msg = WireMessage::result("r1".to_string(), json!({"sum": 3}));
        let encoded = msg.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(
            value,
            json!({"type": "result", "request_id": "r1", "content": {"sum": 3}})
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(WireMessage::from_json(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn rejects_malformed_frame() {
        assert!(WireMessage::from_json("not json at all").is_err());
    }
}
