//! Plugin Test Utilities
//!
//! Plugin directory fixtures, a mock module loader backed by
//! [`NativeModule`]s, and WebAssembly text fixtures for the wasm loader.

use crate::plugin::error::PluginError;
use crate::plugin::error::PluginResult;
use crate::plugin::loader::{LoaderSet, ModuleLoader};
use crate::plugin::manager::PluginManager;
use crate::plugin::native::NativeModule;
use crate::plugin::settings::HostSettings;
use crate::plugin::traits::PluginModule;
use crate::plugin::types::MANIFEST_FILE_NAME;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Entry file name used by plugins served from [`MockLoader`]
pub const MOCK_ENTRY: &str = "main.mock";

/// A temporary plugin root directory
pub struct PluginFixture {
    root: TempDir,
}

impl PluginFixture {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("create temp plugin root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Write `manifest` into `<root>/<dir>/manifest.json`
    pub fn plugin(&self, dir: &str, manifest: Value) -> PathBuf {
        let base = self.root.path().join(dir);
        std::fs::create_dir_all(&base).expect("create plugin dir");
        std::fs::write(
            base.join(MANIFEST_FILE_NAME),
            serde_json::to_vec_pretty(&manifest).expect("serialize manifest"),
        )
        .expect("write manifest");
        base
    }

    /// Write an arbitrary file inside a plugin directory
    pub fn file(&self, dir: &str, relative: &str, contents: impl AsRef<[u8]>) {
        let path = self.root.path().join(dir).join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dir");
        }
        std::fs::write(path, contents).expect("write plugin file");
    }

    /// A plugin whose entry is served by [`MockLoader`]
    pub fn mock_plugin(&self, id: &str, enabled: bool) -> PathBuf {
        let base = self.plugin(
            id,
            json!({"id": id, "name": format!("{id} plugin"), "enabled": enabled, "mainEntry": MOCK_ENTRY}),
        );
        self.file(id, MOCK_ENTRY, id);
        base
    }

    /// A plugin running the given WebAssembly text
    pub fn wat_plugin(&self, id: &str, enabled: bool, wat: &str) -> PathBuf {
        let base = self.plugin(
            id,
            json!({"id": id, "enabled": enabled, "main": "dist/main.wat", "renderer": "./dist/renderer.js"}),
        );
        self.file(id, "dist/main.wat", wat);
        base
    }

    /// Settings pointing at this fixture with short timeouts
    pub fn settings(&self) -> HostSettings {
        HostSettings::new(self.path())
            .with_activation_timeout(Duration::from_secs(2))
            .with_invocation_timeout(Duration::from_secs(2))
    }
}

type ModuleFactory = Arc<dyn Fn() -> NativeModule + Send + Sync>;

/// Loader for `.mock` entries that hands out [`NativeModule`]s by plugin id
#[derive(Clone, Default)]
pub struct MockLoader {
    factories: Arc<Mutex<HashMap<String, ModuleFactory>>>,
    loads: Arc<AtomicUsize>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a fresh module from `factory` whenever `plugin_id` is loaded
    pub fn with_module<F>(self, plugin_id: &str, factory: F) -> Self
    where
        F: Fn() -> NativeModule + Send + Sync + 'static,
    {
        self.factories
            .lock()
            .unwrap()
            .insert(plugin_id.to_string(), Arc::new(factory));
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModuleLoader for MockLoader {
    fn name(&self) -> &str {
        "mock"
    }

    fn extensions(&self) -> Vec<String> {
        vec!["mock".to_string()]
    }

    async fn load(&self, plugin_id: &str, entry: &Path) -> PluginResult<Arc<dyn PluginModule>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let factory = self.factories.lock().unwrap().get(plugin_id).cloned();
        match factory {
            Some(factory) => Ok(Arc::new(factory())),
            None => Err(PluginError::load(
                plugin_id,
                entry,
                "module threw during evaluation",
            )),
        }
    }
}

/// Manager over `fixture` with the default loaders plus `loader`
pub fn manager_with(fixture: &PluginFixture, loader: MockLoader) -> PluginManager {
    manager_with_settings(fixture.settings(), loader)
}

pub fn manager_with_settings(settings: HostSettings, loader: MockLoader) -> PluginManager {
    let mut loaders = LoaderSet::with_defaults();
    loaders.register(Arc::new(loader));
    PluginManager::with_loaders(settings, loaders)
}

/// Module counting activations and exposing `ping` and `count`
pub fn counting_module(activations: Arc<AtomicUsize>) -> NativeModule {
    let reported = Arc::clone(&activations);
    NativeModule::builder()
        .on_activate(move |_context| {
            let activations = Arc::clone(&activations);
            async move {
                activations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .method("ping", |_args| async { Ok(json!("pong")) })
        .method("count", move |_args| {
            let reported = Arc::clone(&reported);
            async move { Ok(json!(reported.load(Ordering::SeqCst))) }
        })
        .build()
}

/// Guest exercising the whole ABI
///
/// `activate` counts activations and emits `ready` with `{"n":1}`;
/// methods: `ping` -> "pong", `echo` -> its argument array, `fail` -> fault
/// "boom", `crash` -> trap, `activations` -> activation count (single digit).
pub const ECHO_WAT: &str = r#"
(module
  (import "host" "emit" (func $emit (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $activations (mut i32) (i32.const 0))
  (data (i32.const 0) "{\"ok\":\"pong\"}")
  (data (i32.const 32) "{\"error\":\"boom\"}")
  (data (i32.const 64) "ready")
  (data (i32.const 72) "{\"n\":1}")
  (data (i32.const 96) "{\"ok\":")
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func $reply (param $ptr i32) (param $len i32) (result i64)
    (i64.or
      (i64.shl (i64.extend_i32_u (local.get $ptr)) (i64.const 32))
      (i64.extend_i32_u (local.get $len))))
  (func (export "activate") (param i32 i32) (result i64)
    (global.set $activations (i32.add (global.get $activations) (i32.const 1)))
    (drop (call $emit (i32.const 64) (i32.const 5) (i32.const 72) (i32.const 7)))
    (i64.const 0))
  (func (export "deactivate") (result i64)
    (i64.const 0))
  (func (export "method:ping") (param i32 i32) (result i64)
    (call $reply (i32.const 0) (i32.const 13)))
  (func (export "method:fail") (param i32 i32) (result i64)
    (call $reply (i32.const 32) (i32.const 16)))
  (func (export "method:crash") (param i32 i32) (result i64)
    unreachable)
  (func (export "method:echo") (param $ptr i32) (param $len i32) (result i64)
    (local $out i32)
    (local.set $out (call $alloc (i32.add (local.get $len) (i32.const 7))))
    (memory.copy (local.get $out) (i32.const 96) (i32.const 6))
    (memory.copy (i32.add (local.get $out) (i32.const 6)) (local.get $ptr) (local.get $len))
    (i32.store8
      (i32.add (i32.add (local.get $out) (i32.const 6)) (local.get $len))
      (i32.const 125))
    (call $reply (local.get $out) (i32.add (local.get $len) (i32.const 7))))
  (func (export "method:activations") (param i32 i32) (result i64)
    (local $out i32)
    (local.set $out (call $alloc (i32.const 8)))
    (memory.copy (local.get $out) (i32.const 96) (i32.const 6))
    (i32.store8
      (i32.add (local.get $out) (i32.const 6))
      (i32.add (i32.const 48) (global.get $activations)))
    (i32.store8 (i32.add (local.get $out) (i32.const 7)) (i32.const 125))
    (call $reply (local.get $out) (i32.const 8))))
"#;

/// Guest whose start function traps during instantiation
pub const TRAP_ON_START_WAT: &str = r#"
(module
  (func $boom unreachable)
  (start $boom))
"#;

/// Guest whose activate hook replies with an error
pub const FAILING_ACTIVATE_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (data (i32.const 0) "{\"error\":\"not today\"}")
  (func (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "activate") (param i32 i32) (result i64)
    (i64.const 21))
  (func (export "method:ping") (param i32 i32) (result i64)
    (i64.const 0)))
"#;

/// Not WebAssembly at all
pub const INVALID_WAT: &str = "(module (func $broken";

/// Guest that never returns from `spin`, with neither `alloc` nor hooks
pub const SPIN_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (data (i32.const 0) "{\"ok\":\"pong\"}")
  (func (export "method:spin") (param i32 i32) (result i64)
    (loop $forever (br $forever))
    (i64.const 0))
  (func (export "method:ping") (param i32 i32) (result i64)
    (i64.const 13)))
"#;

/// Guest exporting only `memory` and a `ping` answering `reply`
pub fn ping_wat(reply: &str) -> String {
    let body = format!("{{\"ok\":\"{reply}\"}}");
    format!(
        r#"
(module
  (memory (export "memory") 1)
  (data (i32.const 0) "{}")
  (func (export "method:ping") (param i32 i32) (result i64)
    (i64.const {})))
"#,
        body.replace('"', "\\\""),
        body.len()
    )
}
