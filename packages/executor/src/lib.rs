//! Wasmtime-backed execution backend.
//!
//! Compiles the resolved module bytes, instantiates them with an empty
//! linker (deployed modules import nothing), looks up the export named in
//! the invoke request, and calls it with arguments converted according to
//! the call signature.
//!
//! Only the direct calling convention is implemented: numeric and boolean
//! parameters, numeric/boolean/unit returns mapped through the signature's
//! native return encoding. Signatures that need a wasm-bindgen shim
//! (strings, vectors, externrefs) are refused as unsupported rather than
//! miscalled.
//!
//! Compilation and the call itself run on the blocking pool so the
//! connection's event loop keeps dispatching while a module grinds.

use bytes::Bytes;
use serde_json::{json, Value as JsValue};
use wasmtime::{Linker, Module, Store, Val};

use wasmfaas_client::{CallSignature, ExecutionError, Executor, TypeDesc};

/// The wasmtime execution backend.
///
/// One compilation engine is shared across all invokes; each call gets a
/// fresh store and instance, so module state never leaks between requests.
#[derive(Default)]
pub struct WasmExecutor {
    engine: wasmtime::Engine,
}

impl WasmExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Executor for WasmExecutor {
    async fn execute(
        &self,
        module: Bytes,
        function: &str,
        signature: &CallSignature,
        args: &[JsValue],
    ) -> Result<JsValue, ExecutionError> {
        let engine = self.engine.clone();
        let function = function.to_owned();
        let signature = signature.clone();
        let args = args.to_vec();

        tokio::task::spawn_blocking(move || {
            call_module(&engine, &module, &function, &signature, &args)
        })
        .await
        .map_err(|e| ExecutionError::Trap(format!("execution task failed: {}", e)))?
    }
}

fn call_module(
    engine: &wasmtime::Engine,
    bytes: &[u8],
    function: &str,
    signature: &CallSignature,
    args: &[JsValue],
) -> Result<JsValue, ExecutionError> {
    if signature.params.len() != args.len() {
        return Err(ExecutionError::MismatchedArgs {
            expected: signature.params.len(),
            got: args.len(),
        });
    }

    let module =
        Module::new(engine, bytes).map_err(|e| ExecutionError::InvalidModule(e.to_string()))?;
    let mut store = Store::new(engine, ());
    let linker: Linker<()> = Linker::new(engine);
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| ExecutionError::InvalidModule(e.to_string()))?;

    let func = instance
        .get_func(&mut store, function)
        .ok_or_else(|| ExecutionError::FunctionNotFound(function.to_owned()))?;

    let params = signature
        .params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (desc, value))| to_val(index, desc, value))
        .collect::<Result<Vec<_>, _>>()?;

    let result_arity = func.ty(&store).results().len();
    let mut results = vec![Val::I32(0); result_arity];
    func.call(&mut store, &params, &mut results)
        .map_err(|e| ExecutionError::Trap(e.to_string()))?;

    tracing::trace!(function, arity = params.len(), "call completed");

    // The module-native encoding, when present, describes what the export
    // actually returns.
    let native_ret = signature.inner_ret.as_ref().unwrap_or(&signature.ret);
    from_val(native_ret, results.first())
}

fn to_val(index: usize, desc: &TypeDesc, value: &JsValue) -> Result<Val, ExecutionError> {
    let bad = |expected: &str| ExecutionError::BadArgument {
        index,
        expected: expected.to_owned(),
        value: value.to_string(),
    };

    match desc {
        TypeDesc::I8 | TypeDesc::U8 | TypeDesc::I16 | TypeDesc::U16 | TypeDesc::I32 => {
            Ok(Val::I32(value.as_i64().ok_or_else(|| bad("integer"))? as i32))
        }
        TypeDesc::U32 => Ok(Val::I32(
            value.as_u64().ok_or_else(|| bad("unsigned integer"))? as u32 as i32,
        )),
        TypeDesc::I64 => Ok(Val::I64(value.as_i64().ok_or_else(|| bad("integer"))?)),
        TypeDesc::U64 => Ok(Val::I64(
            value.as_u64().ok_or_else(|| bad("unsigned integer"))? as i64,
        )),
        TypeDesc::F32 => Ok(Val::F32(
            (value.as_f64().ok_or_else(|| bad("number"))? as f32).to_bits(),
        )),
        TypeDesc::F64 => Ok(Val::F64(
            value.as_f64().ok_or_else(|| bad("number"))?.to_bits(),
        )),
        TypeDesc::Boolean => Ok(Val::I32(
            value.as_bool().ok_or_else(|| bad("boolean"))? as i32,
        )),
        other => Err(ExecutionError::UnsupportedType(format!("{:?}", other))),
    }
}

fn from_val(desc: &TypeDesc, val: Option<&Val>) -> Result<JsValue, ExecutionError> {
    if matches!(desc, TypeDesc::Unit) {
        return Ok(JsValue::Null);
    }
    let val = match val {
        Some(v) => v,
        None => return Ok(JsValue::Null),
    };

    match (desc, val) {
        (TypeDesc::Boolean, Val::I32(v)) => Ok(json!(*v != 0)),
        (TypeDesc::U32, Val::I32(v)) => Ok(json!(*v as u32)),
        (
            TypeDesc::I8 | TypeDesc::U8 | TypeDesc::I16 | TypeDesc::U16 | TypeDesc::I32,
            Val::I32(v),
        ) => Ok(json!(*v)),
        (TypeDesc::U64, Val::I64(v)) => Ok(json!(*v as u64)),
        (TypeDesc::I64, Val::I64(v)) => Ok(json!(*v)),
        (TypeDesc::F32, Val::F32(bits)) => Ok(json!(f32::from_bits(*bits))),
        (TypeDesc::F64, Val::F64(bits)) => Ok(json!(f64::from_bits(*bits))),
        (other, _) => Err(ExecutionError::UnsupportedType(format!("{:?}", other))),
    }
}
