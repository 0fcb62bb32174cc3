//! OPA policies compiled to WebAssembly
//!
//! Each evaluation runs in a fresh store with a fuel budget on a blocking
//! thread. Builtins beyond the core ABI are not provided; a policy that calls
//! one traps and is treated as a denial.

use std::path::Path;
use std::time::Duration;

use wasmtime::{Caller, Config, Engine, ExternType, Instance, Linker, Memory, Module, Store};

use super::types::PolicyInput;
use crate::error::{ApiError, Result};

/// Instruction budget for a single evaluation
const EVAL_FUEL: u64 = 50_000_000;

/// Wall-clock limit for a single evaluation
const EVAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the size of a dumped result
const MAX_RESULT_BYTES: usize = 1024 * 1024;

/// A compiled OPA wasm bundle
#[derive(Clone)]
pub struct OpaWasmPolicy {
    engine: Engine,
    module: Module,
}

impl OpaWasmPolicy {
    /// Read and compile the policy module at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            ApiError::configuration(format!(
                "failed to read policy module {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Compile a policy module from its binary (or text) form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut config = Config::new();
        config.consume_fuel(true);

        let engine = Engine::new(&config)
            .map_err(|e| ApiError::configuration(format!("failed to create wasm engine: {}", e)))?;
        let module = Module::new(&engine, bytes)
            .map_err(|e| ApiError::configuration(format!("invalid policy module: {}", e)))?;

        Ok(Self { engine, module })
    }

    pub async fn evaluate(&self, input: &PolicyInput) -> Result<bool> {
        let input_json = serde_json::to_string(input)
            .map_err(|e| ApiError::policy(format!("failed to serialize policy input: {}", e)))?;
        let policy = self.clone();

        let task = tokio::task::spawn_blocking(move || policy.run(&input_json));
        let output = tokio::time::timeout(EVAL_TIMEOUT, task)
            .await
            .map_err(|_| ApiError::policy("policy evaluation timed out"))?
            .map_err(|e| ApiError::policy(format!("policy evaluation task failed: {}", e)))??;

        interpret_result(&output)
    }

    /// Instantiate the module and run the default entrypoint, returning the
    /// dumped result set
    fn run(&self, input_json: &str) -> Result<String> {
        let mut store = Store::new(&self.engine, ());
        store
            .set_fuel(EVAL_FUEL)
            .map_err(|e| ApiError::policy(format!("failed to set fuel: {}", e)))?;

        let memory = self.create_memory(&mut store)?;
        let linker = self.linker(&store, memory)?;
        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| ApiError::policy(format!("failed to instantiate policy: {}", e)))?;

        let data_addr = load_json(&mut store, &instance, memory, "{}")?;
        let input_addr = load_json(&mut store, &instance, memory, input_json)?;

        let ctx_new = typed::<(), i32>(&mut store, &instance, "opa_eval_ctx_new")?;
        let set_input = typed::<(i32, i32), ()>(&mut store, &instance, "opa_eval_ctx_set_input")?;
        let set_data = typed::<(i32, i32), ()>(&mut store, &instance, "opa_eval_ctx_set_data")?;
        let eval = typed::<i32, i32>(&mut store, &instance, "eval")?;
        let get_result = typed::<i32, i32>(&mut store, &instance, "opa_eval_ctx_get_result")?;
        let json_dump = typed::<i32, i32>(&mut store, &instance, "opa_json_dump")?;

        let ctx = ctx_new.call(&mut store, ()).map_err(trap)?;
        set_input.call(&mut store, (ctx, input_addr)).map_err(trap)?;
        set_data.call(&mut store, (ctx, data_addr)).map_err(trap)?;
        eval.call(&mut store, ctx).map_err(trap)?;

        let result_addr = get_result.call(&mut store, ctx).map_err(trap)?;
        let dump_addr = json_dump.call(&mut store, result_addr).map_err(trap)?;

        read_c_string(&store, memory, dump_addr)
    }

    /// OPA modules import their linear memory as `env.memory`
    fn create_memory(&self, store: &mut Store<()>) -> Result<Memory> {
        let memory_type = self
            .module
            .imports()
            .find_map(|import| match (import.module(), import.name(), import.ty()) {
                ("env", "memory", ExternType::Memory(ty)) => Some(ty),
                _ => None,
            })
            .ok_or_else(|| ApiError::policy("policy module does not import env.memory"))?;

        Memory::new(store, memory_type)
            .map_err(|e| ApiError::policy(format!("failed to allocate policy memory: {}", e)))
    }

    fn linker(&self, store: &Store<()>, memory: Memory) -> Result<Linker<()>> {
        let mut linker = Linker::new(&self.engine);
        let link_err = |e: wasmtime::Error| ApiError::policy(format!("failed to link policy: {}", e));

        linker.define(store, "env", "memory", memory).map_err(link_err)?;
        linker
            .func_wrap("env", "opa_abort", |_: Caller<'_, ()>, _addr: i32| -> wasmtime::Result<()> {
                Err(wasmtime::Error::msg("policy aborted"))
            })
            .map_err(link_err)?;
        linker
            .func_wrap("env", "opa_println", |_: Caller<'_, ()>, _addr: i32| {})
            .map_err(link_err)?;
        linker
            .func_wrap("env", "opa_builtin0", |id: i32, _ctx: i32| -> wasmtime::Result<i32> {
                unsupported_builtin(id)
            })
            .map_err(link_err)?;
        linker
            .func_wrap("env", "opa_builtin1", |id: i32, _ctx: i32, _a: i32| -> wasmtime::Result<i32> {
                unsupported_builtin(id)
            })
            .map_err(link_err)?;
        linker
            .func_wrap(
                "env",
                "opa_builtin2",
                |id: i32, _ctx: i32, _a: i32, _b: i32| -> wasmtime::Result<i32> { unsupported_builtin(id) },
            )
            .map_err(link_err)?;
        linker
            .func_wrap(
                "env",
                "opa_builtin3",
                |id: i32, _ctx: i32, _a: i32, _b: i32, _c: i32| -> wasmtime::Result<i32> {
                    unsupported_builtin(id)
                },
            )
            .map_err(link_err)?;
        linker
            .func_wrap(
                "env",
                "opa_builtin4",
                |id: i32, _ctx: i32, _a: i32, _b: i32, _c: i32, _d: i32| -> wasmtime::Result<i32> {
                    unsupported_builtin(id)
                },
            )
            .map_err(link_err)?;

        Ok(linker)
    }
}

fn unsupported_builtin(id: i32) -> wasmtime::Result<i32> {
    Err(wasmtime::Error::msg(format!("unsupported OPA builtin {}", id)))
}

fn trap(e: wasmtime::Error) -> ApiError {
    ApiError::policy(format!("policy evaluation failed: {}", e))
}

fn typed<Params, Results>(
    store: &mut Store<()>,
    instance: &Instance,
    name: &str,
) -> Result<wasmtime::TypedFunc<Params, Results>>
where
    Params: wasmtime::WasmParams,
    Results: wasmtime::WasmResults,
{
    instance
        .get_typed_func::<Params, Results>(store, name)
        .map_err(|e| ApiError::policy(format!("policy module export '{}': {}", name, e)))
}

/// Copy a JSON document into policy memory and parse it there
fn load_json(store: &mut Store<()>, instance: &Instance, memory: Memory, json: &str) -> Result<i32> {
    let malloc = typed::<i32, i32>(store, instance, "opa_malloc")?;
    let parse = typed::<(i32, i32), i32>(store, instance, "opa_json_parse")?;

    let len = i32::try_from(json.len()).map_err(|_| ApiError::policy("policy input too large"))?;
    let addr = malloc.call(&mut *store, len).map_err(trap)?;

    memory
        .write(&mut *store, addr as u32 as usize, json.as_bytes())
        .map_err(|e| ApiError::policy(format!("failed to write policy memory: {}", e)))?;

    let value_addr = parse.call(&mut *store, (addr, len)).map_err(trap)?;
    if value_addr == 0 {
        return Err(ApiError::policy("policy module failed to parse JSON"));
    }
    Ok(value_addr)
}

fn read_c_string(store: &Store<()>, memory: Memory, addr: i32) -> Result<String> {
    let data = memory.data(store);
    let start = addr as u32 as usize;
    let tail = data
        .get(start..)
        .ok_or_else(|| ApiError::policy("policy result address out of bounds"))?;

    let len = tail
        .iter()
        .take(MAX_RESULT_BYTES)
        .position(|b| *b == 0)
        .ok_or_else(|| ApiError::policy("policy result is not terminated"))?;

    String::from_utf8(tail[..len].to_vec())
        .map_err(|e| ApiError::policy(format!("policy result is not UTF-8: {}", e)))
}

/// Reduce an OPA result set to a decision
///
/// The first result's value decides: a boolean directly, or an object's
/// boolean `allow` field. Anything else is an error.
fn interpret_result(output: &str) -> Result<bool> {
    let results: serde_json::Value = serde_json::from_str(output)
        .map_err(|e| ApiError::policy(format!("policy result is not JSON: {}", e)))?;

    let value = results
        .get(0)
        .and_then(|r| r.get("result"))
        .ok_or_else(|| ApiError::policy("policy produced no result"))?;

    match value {
        serde_json::Value::Bool(b) => Ok(*b),
        serde_json::Value::Object(map) => match map.get("allow") {
            Some(serde_json::Value::Bool(b)) => Ok(*b),
            _ => Err(ApiError::policy("policy result object has no boolean 'allow'")),
        },
        other => Err(ApiError::policy(format!("unexpected policy result: {}", other))),
    }
}
