//! Common test utilities: plugin directory fixtures and a handle on the binary

use serde_json::{json, Value};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Guest with `ping`, `echo` and `fail`; `activate` emits `ready`
pub const ECHO_WAT: &str = r#"
(module
  (import "host" "emit" (func $emit (param i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
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
    (drop (call $emit (i32.const 64) (i32.const 5) (i32.const 72) (i32.const 7)))
    (i64.const 0))
  (func (export "method:ping") (param i32 i32) (result i64)
    (call $reply (i32.const 0) (i32.const 13)))
  (func (export "method:fail") (param i32 i32) (result i64)
    (call $reply (i32.const 32) (i32.const 16)))
  (func (export "method:echo") (param $ptr i32) (param $len i32) (result i64)
    (local $out i32)
    (local.set $out (call $alloc (i32.add (local.get $len) (i32.const 7))))
    (memory.copy (local.get $out) (i32.const 96) (i32.const 6))
    (memory.copy (i32.add (local.get $out) (i32.const 6)) (local.get $ptr) (local.get $len))
    (i32.store8
      (i32.add (i32.add (local.get $out) (i32.const 6)) (local.get $len))
      (i32.const 125))
    (call $reply (local.get $out) (i32.add (local.get $len) (i32.const 7)))))
"#;

/// Temporary plugin directory plus an empty configuration file
pub struct PluginDir {
    temp: TempDir,
}

impl PluginDir {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        std::fs::create_dir_all(temp.path().join("plugins")).expect("create plugins dir");
        std::fs::write(temp.path().join("plughost.toml"), "").expect("write config");
        Self { temp }
    }

    pub fn plugins(&self) -> PathBuf {
        self.temp.path().join("plugins")
    }

    pub fn config_file(&self) -> PathBuf {
        self.temp.path().join("plughost.toml")
    }

    pub fn write_config(&self, contents: &str) {
        std::fs::write(self.config_file(), contents).expect("write config");
    }

    /// Plugin directory `<dir>` with the given manifest
    pub fn plugin(&self, dir: &str, manifest: Value) -> PathBuf {
        let path = self.plugins().join(dir);
        std::fs::create_dir_all(&path).expect("create plugin dir");
        std::fs::write(path.join("manifest.json"), manifest.to_string()).expect("write manifest");
        path
    }

    /// WebAssembly text plugin running [`ECHO_WAT`]
    pub fn echo_plugin(&self, id: &str, enabled: bool) -> PathBuf {
        let path = self.plugin(
            id,
            json!({
                "id": id,
                "name": format!("{id} plugin"),
                "version": "1.2.3",
                "enabled": enabled,
                "main": "dist/main.wat",
                "renderer": "./dist/renderer.js"
            }),
        );
        std::fs::create_dir_all(path.join("dist")).expect("create dist");
        std::fs::write(path.join("dist").join("main.wat"), ECHO_WAT).expect("write module");
        path
    }

    /// The binary pointed at this directory, colour and logging off
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_plughost"));
        command
            .arg("--plugins-dir")
            .arg(self.plugins())
            .arg("--config-file")
            .arg(self.config_file())
            .args(["--color", "false", "--log-level", "off"]);
        command
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("run plughost")
    }

    /// Run `serve` with the given request lines on stdin
    pub fn serve(&self, lines: &[&str]) -> Vec<Value> {
        let mut child = self
            .command()
            .arg("serve")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn plughost serve");

        {
            let mut stdin = child.stdin.take().expect("stdin");
            for line in lines {
                writeln!(stdin, "{line}").expect("write request");
            }
        }

        let output = child.wait_with_output().expect("wait for serve");
        assert!(output.status.success(), "serve exited with {:?}", output.status);
        parse_lines(&output.stdout)
    }
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn parse_lines(bytes: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("every output line is JSON"))
        .collect()
}

pub fn response_for(responses: &[Value], id: i64) -> &Value {
    responses
        .iter()
        .find(|r| r["id"] == id)
        .unwrap_or_else(|| panic!("no response for id {id} in {responses:?}"))
}
