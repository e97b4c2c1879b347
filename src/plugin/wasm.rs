//! WebAssembly Plugin Modules
//!
//! Core wasm modules (binary `.wasm` or text `.wat`) run inside a wasmtime
//! store owned by the module handle. The guest ABI is JSON over linear memory:
//!
//! - `memory`: exported linear memory
//! - `alloc(len: i32) -> i32`: optional, reserve `len` bytes for host input;
//!   guests without it receive `(0, 0)` instead of their input
//! - `activate(ptr, len) -> i64`: optional, receives the activation context
//! - `deactivate() -> i64`: optional teardown
//! - `method:<name>(ptr, len) -> i64`: receives the JSON argument array
//!
//! Every hook returns `(ptr << 32) | len` of a reply `{"ok": value}` or
//! `{"error": "message"}`. A zero length is `ok` with `null`. Guests may
//! import `host.emit(name_ptr, name_len, payload_ptr, payload_len) -> i32`
//! to publish an event once activated.
//!
//! Guest calls that outlive their timeout are interrupted through epoch
//! interruption: the abandoned call flags its store and bumps the engine
//! epoch, and the guest traps at its next loop header or function entry.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::events::EventEmitter;
use crate::plugin::loader::ModuleLoader;
use crate::plugin::traits::{
    FaultResult, Initializable, MethodTable, PluginFault, PluginModule, Teardown,
};
use crate::plugin::types::ActivationContext;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use wasmtime::{
    Caller, Config, Engine, ExternType, Instance, Linker, Memory, Module, Store, UpdateDeadline,
};

const METHOD_EXPORT_PREFIX: &str = "method:";
const ACTIVATE_EXPORT: &str = "activate";
const DEACTIVATE_EXPORT: &str = "deactivate";
const ALLOC_EXPORT: &str = "alloc";

const EMIT_OK: i32 = 0;
const EMIT_BAD_INPUT: i32 = 1;
const EMIT_UNBOUND: i32 = 2;

/// Loader for `.wasm` and `.wat` entries
#[derive(Clone)]
pub struct WasmLoader {
    engine: Engine,
}

impl WasmLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for WasmLoader {
    fn default() -> Self {
        let mut config = Config::new();
        config.epoch_interruption(true);
        let engine = Engine::new(&config).unwrap_or_else(|e| {
            log::warn!("Epoch interruption unavailable, guest calls cannot be interrupted: {e:#}");
            Engine::default()
        });
        Self { engine }
    }
}

#[async_trait::async_trait]
impl ModuleLoader for WasmLoader {
    fn name(&self) -> &str {
        "wasm"
    }

    fn extensions(&self) -> Vec<String> {
        vec!["wasm".to_string(), "wat".to_string()]
    }

    async fn load(&self, plugin_id: &str, entry: &Path) -> PluginResult<Arc<dyn PluginModule>> {
        let bytes = tokio::fs::read(entry)
            .await
            .map_err(|e| PluginError::load(plugin_id, entry, e))?;

        let engine = self.engine.clone();
        let id = plugin_id.to_string();
        // Compilation and the start function both run here
        let module = tokio::task::spawn_blocking(move || WasmModule::instantiate(&engine, id, &bytes))
            .await
            .map_err(|e| PluginError::load(plugin_id, entry, e))?
            .map_err(|cause| PluginError::load(plugin_id, entry, cause))?;

        log::debug!(
            "Instantiated wasm module for '{}' with methods {:?}",
            plugin_id,
            module.methods
        );
        Ok(Arc::new(module))
    }
}

/// Per-store host state
#[derive(Default)]
struct GuestState {
    emitter: Option<EventEmitter>,
    /// Set when the call currently running in this store was abandoned
    cancelled: Arc<AtomicBool>,
}

/// Interrupts the guest call it guards unless disarmed first
struct InterruptOnDrop {
    engine: Engine,
    cancelled: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if self.armed {
            // The flag must be visible before the epoch moves
            self.cancelled.store(true, Ordering::SeqCst);
            self.engine.increment_epoch();
        }
    }
}

/// An instantiated guest and the store it lives in
struct GuestInstance {
    store: Store<GuestState>,
    instance: Instance,
}

/// A loaded WebAssembly plugin
///
/// Calls are serialized on the instance and run on the blocking pool.
pub struct WasmModule {
    plugin_id: String,
    engine: Engine,
    guest: Arc<Mutex<GuestInstance>>,
    methods: Vec<String>,
    has_activate: bool,
    has_deactivate: bool,
}

impl WasmModule {
    fn instantiate(engine: &Engine, plugin_id: String, bytes: &[u8]) -> Result<Self, String> {
        let module = Module::new(engine, bytes).map_err(describe)?;

        let mut linker: Linker<GuestState> = Linker::new(engine);
        linker
            .func_wrap(
                "host",
                "emit",
                |mut caller: Caller<'_, GuestState>,
                 name_ptr: i32,
                 name_len: i32,
                 payload_ptr: i32,
                 payload_len: i32|
                 -> i32 {
                    host_emit(&mut caller, (name_ptr, name_len), (payload_ptr, payload_len))
                },
            )
            .map_err(describe)?;

        let mut store = Store::new(engine, GuestState::default());
        // Epochs only move when some call is abandoned; other stores keep going
        store.epoch_deadline_callback(|context| {
            if context.data().cancelled.load(Ordering::SeqCst) {
                Err(wasmtime::Error::msg("guest call interrupted after its timeout"))
            } else {
                Ok(UpdateDeadline::Continue(1))
            }
        });
        store.set_epoch_deadline(1);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(describe)?;

        let mut methods = Vec::new();
        for export in module.exports() {
            let Some(method) = export.name().strip_prefix(METHOD_EXPORT_PREFIX) else {
                continue;
            };
            if !matches!(export.ty(), ExternType::Func(_)) {
                continue;
            }
            instance
                .get_typed_func::<(i32, i32), i64>(&mut store, export.name())
                .map_err(|e| format!("export '{}' has the wrong signature: {}", export.name(), e))?;
            methods.push(method.to_string());
        }
        methods.sort();

        let has_activate = module.get_export(ACTIVATE_EXPORT).is_some();
        if has_activate {
            instance
                .get_typed_func::<(i32, i32), i64>(&mut store, ACTIVATE_EXPORT)
                .map_err(|e| format!("export 'activate' has the wrong signature: {e}"))?;
        }
        if module.get_export(ALLOC_EXPORT).is_some() {
            instance
                .get_typed_func::<i32, i32>(&mut store, ALLOC_EXPORT)
                .map_err(|e| format!("export 'alloc' has the wrong signature: {e}"))?;
        }
        let has_deactivate = module.get_export(DEACTIVATE_EXPORT).is_some();
        if has_deactivate {
            instance
                .get_typed_func::<(), i64>(&mut store, DEACTIVATE_EXPORT)
                .map_err(|e| format!("export 'deactivate' has the wrong signature: {e}"))?;
        }

        Ok(Self {
            plugin_id,
            engine: engine.clone(),
            guest: Arc::new(Mutex::new(GuestInstance { store, instance })),
            methods,
            has_activate,
            has_deactivate,
        })
    }

    /// Run `call` against the guest on the blocking pool
    ///
    /// If this future is dropped before the call returns (a timeout aborted
    /// it), the guest is interrupted so the instance lock is released.
    async fn run<F>(&self, call: F) -> FaultResult<Value>
    where
        F: FnOnce(&mut GuestInstance) -> Result<Value, String> + Send + 'static,
    {
        let guest = Arc::clone(&self.guest);
        let plugin_id = self.plugin_id.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut interrupt = InterruptOnDrop {
            engine: self.engine.clone(),
            cancelled: Arc::clone(&cancelled),
            armed: true,
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let mut guest = guest
                .lock()
                .map_err(|_| PluginFault::new(format!("plugin '{plugin_id}' instance is poisoned")))?;
            guest.store.data_mut().cancelled = Arc::clone(&cancelled);
            guest.store.set_epoch_deadline(1);
            // Checked after the deadline is set, so an interrupt racing the
            // setup is never lost
            if cancelled.load(Ordering::SeqCst) {
                return Err(PluginFault::new("plugin call abandoned before it started"));
            }
            call(&mut guest).map_err(PluginFault::from)
        })
        .await;
        interrupt.armed = false;

        outcome.map_err(|e| PluginFault::new(format!("plugin call aborted: {e}")))?
    }
}

impl GuestInstance {
    fn memory(&mut self) -> Result<Memory, String> {
        self.instance
            .get_memory(&mut self.store, "memory")
            .ok_or_else(|| "module does not export 'memory'".to_string())
    }

    /// Copy `input` into guest memory through its `alloc` export
    ///
    /// A guest without `alloc` takes no input and gets `(0, 0)`.
    fn write_input(&mut self, input: &[u8]) -> Result<(i32, i32), String> {
        if input.is_empty() || self.instance.get_func(&mut self.store, ALLOC_EXPORT).is_none() {
            return Ok((0, 0));
        }
        let alloc = self
            .instance
            .get_typed_func::<i32, i32>(&mut self.store, ALLOC_EXPORT)
            .map_err(describe)?;
        let len = i32::try_from(input.len()).map_err(|_| "input too large".to_string())?;
        let ptr = alloc.call(&mut self.store, len).map_err(describe)?;

        let memory = self.memory()?;
        memory
            .write(&mut self.store, ptr as u32 as usize, input)
            .map_err(|e| format!("alloc returned an invalid region: {e}"))?;
        Ok((ptr, len))
    }

    fn call_with_input(&mut self, export: &str, input: &[u8]) -> Result<Value, String> {
        let func = self
            .instance
            .get_typed_func::<(i32, i32), i64>(&mut self.store, export)
            .map_err(describe)?;
        let (ptr, len) = self.write_input(input)?;
        let packed = func.call(&mut self.store, (ptr, len)).map_err(describe)?;
        self.read_reply(packed)
    }

    fn call_without_input(&mut self, export: &str) -> Result<Value, String> {
        let func = self
            .instance
            .get_typed_func::<(), i64>(&mut self.store, export)
            .map_err(describe)?;
        let packed = func.call(&mut self.store, ()).map_err(describe)?;
        self.read_reply(packed)
    }

    fn read_reply(&mut self, packed: i64) -> Result<Value, String> {
        let (ptr, len) = unpack(packed);
        if len == 0 {
            return Ok(Value::Null);
        }
        let memory = self.memory()?;
        let mut buffer = vec![0u8; len];
        memory
            .read(&self.store, ptr, &mut buffer)
            .map_err(|e| format!("reply points outside guest memory: {e}"))?;
        decode_reply(&buffer)
    }
}

/// Split a packed `(ptr << 32) | len` reply
fn unpack(packed: i64) -> (usize, usize) {
    let packed = packed as u64;
    ((packed >> 32) as usize, (packed & 0xffff_ffff) as usize)
}

/// Decode a guest reply into its value or fault message
fn decode_reply(bytes: &[u8]) -> Result<Value, String> {
    let reply: Value =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid reply from plugin: {e}"))?;
    let Value::Object(mut fields) = reply else {
        return Err("plugin reply must be an object with 'ok' or 'error'".to_string());
    };
    match fields.remove("error") {
        Some(Value::String(message)) => Err(message),
        Some(other) => Err(other.to_string()),
        None => Ok(fields.remove("ok").unwrap_or(Value::Null)),
    }
}

fn describe(error: wasmtime::Error) -> String {
    format!("{error:#}")
}

fn host_emit(
    caller: &mut Caller<'_, GuestState>,
    (name_ptr, name_len): (i32, i32),
    (payload_ptr, payload_len): (i32, i32),
) -> i32 {
    let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
        return EMIT_BAD_INPUT;
    };
    let data = memory.data(&*caller);

    let Some(name) = guest_slice(data, name_ptr, name_len)
        .and_then(|bytes| std::str::from_utf8(bytes).ok())
        .map(str::to_string)
    else {
        return EMIT_BAD_INPUT;
    };
    let payload = if payload_len == 0 {
        Value::Null
    } else {
        match guest_slice(data, payload_ptr, payload_len).map(serde_json::from_slice::<Value>) {
            Some(Ok(payload)) => payload,
            _ => return EMIT_BAD_INPUT,
        }
    };

    match &caller.data().emitter {
        Some(emitter) => {
            emitter.emit(name, payload);
            EMIT_OK
        }
        None => {
            log::debug!("Guest emitted '{name}' before activation, dropped");
            EMIT_UNBOUND
        }
    }
}

fn guest_slice(data: &[u8], ptr: i32, len: i32) -> Option<&[u8]> {
    let start = ptr as u32 as usize;
    let end = start.checked_add(len as u32 as usize)?;
    data.get(start..end)
}

#[async_trait::async_trait]
impl Initializable for WasmModule {
    async fn activate(&self, context: &ActivationContext) -> FaultResult<()> {
        let emitter = context.events.clone();
        let input = serde_json::to_vec(&context.to_json())
            .map_err(|e| PluginFault::new(e.to_string()))?;
        let has_activate = self.has_activate;

        self.run(move |guest| {
            guest.store.data_mut().emitter = Some(emitter);
            if has_activate {
                guest.call_with_input(ACTIVATE_EXPORT, &input)
            } else {
                Ok(Value::Null)
            }
        })
        .await
        .map(|_| ())
    }
}

#[async_trait::async_trait]
impl MethodTable for WasmModule {
    fn method_names(&self) -> Vec<String> {
        self.methods.clone()
    }

    async fn call(&self, method: &str, args: Vec<Value>) -> FaultResult<Value> {
        if !self.has_method(method) {
            return Err(format!("Method {method} not found").into());
        }
        let input = serde_json::to_vec(&Value::Array(args))
            .map_err(|e| PluginFault::new(e.to_string()))?;
        let export = format!("{METHOD_EXPORT_PREFIX}{method}");
        self.run(move |guest| guest.call_with_input(&export, &input))
            .await
    }
}

#[async_trait::async_trait]
impl Teardown for WasmModule {
    async fn deactivate(&self) -> FaultResult<()> {
        self.run(|guest| {
            let result = guest.call_without_input(DEACTIVATE_EXPORT);
            guest.store.data_mut().emitter = None;
            result
        })
        .await
        .map(|_| ())
    }
}

impl PluginModule for WasmModule {
    // Always present: activation binds the event emitter even without a guest hook
    fn initializer(&self) -> Option<&dyn Initializable> {
        Some(self)
    }

    fn methods(&self) -> Option<&dyn MethodTable> {
        if self.methods.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn teardown(&self) -> Option<&dyn Teardown> {
        if self.has_deactivate {
            Some(self)
        } else {
            None
        }
    }
}
