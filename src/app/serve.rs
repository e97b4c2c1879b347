//! JSON line protocol
//!
//! One request object per input line, one response object per output line.
//! Requests carry an `id` that is echoed in the response; responses hold
//! either `result` or `error`. Requests run concurrently, so responses may
//! arrive out of order. Events for subscribed plugins are interleaved as
//! `{"channel": "plugin:event:<id>:<event>", "payload": ...}`.

use crate::plugin::api::{EventFilter, PluginEvent, PluginManager};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;

/// Boundary operations accepted on the wire
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Request {
    List,
    #[serde(rename_all = "camelCase")]
    Invoke {
        plugin_id: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    #[serde(rename_all = "camelCase")]
    RendererLocation { plugin_id: String },
    #[serde(rename_all = "camelCase")]
    Activate { plugin_id: String },
    #[serde(rename_all = "camelCase")]
    Deactivate { plugin_id: String },
    #[serde(rename_all = "camelCase")]
    Subscribe {
        plugin_id: String,
        #[serde(default)]
        event: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Unsubscribe {
        plugin_id: String,
        #[serde(default)]
        event: Option<String>,
    },
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({"id": id, "result": result})
}

fn error_response(id: Value, error: impl Into<String>) -> Value {
    json!({"id": id, "error": error.into()})
}

/// Parse one line into its echo id and request
fn parse_request(line: &str) -> Result<(Value, Request), Value> {
    let raw: Value = serde_json::from_str(line)
        .map_err(|e| error_response(Value::Null, format!("Invalid request: {e}")))?;
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    match serde_json::from_value::<Request>(raw) {
        Ok(request) => Ok((id, request)),
        Err(e) => Err(error_response(id, format!("Invalid request: {e}"))),
    }
}

/// Event filters of one protocol session
#[derive(Debug, Default)]
struct Session {
    filters: Vec<EventFilter>,
}

impl Session {
    fn subscribe(&mut self, filter: EventFilter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    fn unsubscribe(&mut self, filter: &EventFilter) -> bool {
        let before = self.filters.len();
        self.filters.retain(|f| f != filter);
        self.filters.len() != before
    }

    fn wants(&self, event: &PluginEvent) -> bool {
        self.filters.iter().any(|filter| filter.matches(event))
    }
}

fn filter_for(plugin_id: &str, event: Option<&str>) -> EventFilter {
    let filter = EventFilter::plugin(plugin_id);
    match event {
        Some(event) => filter.event(event),
        None => filter,
    }
}

fn event_message(event: &PluginEvent) -> Value {
    json!({"channel": event.channel(), "payload": event.payload})
}

/// Run a request that does not touch session state
async fn execute(manager: &PluginManager, id: Value, request: Request) -> Value {
    match request {
        Request::List => match serde_json::to_value(manager.list().await) {
            Ok(manifests) => ok_response(id, manifests),
            Err(e) => error_response(id, e.to_string()),
        },
        Request::Invoke {
            plugin_id,
            method,
            args,
        } => {
            let envelope = manager.invoke(&plugin_id, &method, args).await;
            match serde_json::to_value(&envelope) {
                Ok(envelope) => ok_response(id, envelope),
                Err(e) => error_response(id, e.to_string()),
            }
        }
        Request::RendererLocation { plugin_id } => {
            let location = manager.get_renderer_location(&plugin_id).await;
            ok_response(id, json!(location))
        }
        Request::Activate { plugin_id } => match manager.activate(&plugin_id).await {
            Ok(record) => ok_response(id, json!({"id": record.id(), "isActive": record.is_active})),
            Err(e) => error_response(id, e.to_string()),
        },
        Request::Deactivate { plugin_id } => match manager.deactivate(&plugin_id).await {
            Ok(record) => ok_response(id, json!({"id": record.id(), "isActive": record.is_active})),
            Err(e) => error_response(id, e.to_string()),
        },
        Request::Subscribe { .. } | Request::Unsubscribe { .. } => {
            error_response(id, "Subscriptions are handled by the session")
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await
}

/// Serve requests from `reader` until it is exhausted
///
/// Outstanding requests are completed and buffered events flushed before
/// returning.
pub async fn serve<R, W>(manager: Arc<PluginManager>, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut events = manager.subscribe_filtered(EventFilter::all());
    let mut session = Session::default();
    let mut tasks: JoinSet<Value> = JoinSet::new();
    let mut input_open = true;

    log::debug!("Serving line protocol");
    while input_open || !tasks.is_empty() {
        tokio::select! {
            line = lines.next_line(), if input_open => {
                let Some(line) = line? else {
                    log::debug!("Input closed, finishing {} outstanding requests", tasks.len());
                    input_open = false;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_request(&line) {
                    Err(response) => write_line(&mut writer, &response).await?,
                    Ok((id, Request::Subscribe { plugin_id, event })) => {
                        session.subscribe(filter_for(&plugin_id, event.as_deref()));
                        write_line(&mut writer, &ok_response(id, json!(true))).await?;
                    }
                    Ok((id, Request::Unsubscribe { plugin_id, event })) => {
                        let removed = session.unsubscribe(&filter_for(&plugin_id, event.as_deref()));
                        write_line(&mut writer, &ok_response(id, json!(removed))).await?;
                    }
                    Ok((id, request)) => {
                        log::trace!("Dispatching {:?}", request);
                        let manager = Arc::clone(&manager);
                        tasks.spawn(async move { execute(&manager, id, request).await });
                    }
                }
            }
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined {
                    Ok(response) => write_line(&mut writer, &response).await?,
                    Err(e) => log::error!("Request task failed: {e}"),
                }
            }
            Some(event) = events.recv() => {
                if session.wants(&event) {
                    write_line(&mut writer, &event_message(&event)).await?;
                }
            }
        }
    }

    while let Some(event) = events.try_recv() {
        if session.wants(&event) {
            write_line(&mut writer, &event_message(&event)).await?;
        }
    }
    writer.flush().await
}
