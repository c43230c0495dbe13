//! Broadcast sink
//!
//! Publishes schema and sample events on a tokio broadcast channel so other
//! components (a live view, an IPC bridge) can follow a session as it is
//! recorded. Events serialize to the transport field layout: `id`, `time`
//! and exactly one of `intValue`, `longValue`, `floatValue`, `doubleValue`,
//! `stringValue`.

use crate::codec::{Signal, SignalId, Value, ValueType};
use crate::ingest::error::SinkResult;
use crate::ingest::sink::Sink;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Typed payload of a sample event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportValue {
    IntValue(i32),
    LongValue(i64),
    FloatValue(f32),
    DoubleValue(f64),
    StringValue(String),
}

impl From<&Value> for TransportValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int32(v) => TransportValue::IntValue(*v),
            Value::Int64(v) => TransportValue::LongValue(*v),
            Value::Float32(v) => TransportValue::FloatValue(*v),
            Value::Float64(v) => TransportValue::DoubleValue(*v),
            Value::Utf8(v) => TransportValue::StringValue(v.clone()),
        }
    }
}

impl From<TransportValue> for Value {
    fn from(value: TransportValue) -> Self {
        match value {
            TransportValue::IntValue(v) => Value::Int32(v),
            TransportValue::LongValue(v) => Value::Int64(v),
            TransportValue::FloatValue(v) => Value::Float32(v),
            TransportValue::DoubleValue(v) => Value::Float64(v),
            TransportValue::StringValue(v) => Value::Utf8(v),
        }
    }
}

/// Event published by a `BroadcastSink`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TransportEvent {
    /// A signal was registered
    Schema {
        name: String,
        id: SignalId,
        #[serde(rename = "type")]
        value_type: ValueType,
    },
    /// A sample was logged
    Sample {
        id: SignalId,
        time: i64,
        #[serde(flatten)]
        value: TransportValue,
    },
}

/// Sink that fans events out to subscribers
///
/// Clones share the channel; keep one to subscribe after handing the sink
/// to a pipeline.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<TransportEvent>,
    open: bool,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, open: false }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: TransportEvent) {
        // No subscribers is fine
        if self.tx.send(event).is_err() {
            tracing::trace!("Broadcast event had no subscribers");
        }
    }
}

impl Sink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn check_permissions(&self) -> SinkResult<()> {
        Ok(())
    }

    fn open(&mut self) -> SinkResult<()> {
        self.open = true;
        tracing::debug!(subscribers = self.tx.receiver_count(), "Broadcast sink opened");
        Ok(())
    }

    fn register_signal(&mut self, signal: &Signal) -> SinkResult<()> {
        self.publish(TransportEvent::Schema {
            name: signal.name.clone(),
            id: signal.id,
            value_type: signal.value_type,
        });
        Ok(())
    }

    fn insert_log(&mut self, signal_id: SignalId, time: i64, value: &Value) -> SinkResult<()> {
        if !self.open {
            return Ok(());
        }
        self.publish(TransportEvent::Sample {
            id: signal_id,
            time,
            value: value.into(),
        });
        Ok(())
    }

    fn close(&mut self) -> SinkResult<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_event_fields() {
        let event = TransportEvent::Sample {
            id: 3,
            time: 120,
            value: TransportValue::LongValue(9),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sample");
        assert_eq!(json["id"], 3);
        assert_eq!(json["time"], 120);
        assert_eq!(json["longValue"], 9);
        assert!(json.get("intValue").is_none());
    }

    #[test]
    fn test_schema_event_fields() {
        let event = TransportEvent::Schema {
            name: "battery".into(),
            id: 0,
            value_type: ValueType::Int32,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "schema");
        assert_eq!(json["name"], "battery");
        assert_eq!(json["type"], "int32");
    }

    #[test]
    fn test_parse_string_sample() {
        let json = r#"{"event":"sample","id":2,"time":50,"stringValue":"wlan0"}"#;
        let event: TransportEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            TransportEvent::Sample {
                id: 2,
                time: 50,
                value: TransportValue::StringValue("wlan0".into()),
            }
        );
    }

    #[test]
    fn test_sink_publishes() {
        let mut sink = BroadcastSink::new(16);
        let mut rx = sink.subscribe();

        sink.open().unwrap();
        sink.register_signal(&Signal::new(1, "light", ValueType::Float32))
            .unwrap();
        sink.insert_log(1, 10, &Value::Float32(0.5)).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), TransportEvent::Schema { id: 1, .. }));
        let sample = rx.try_recv().unwrap();
        assert_eq!(
            sample,
            TransportEvent::Sample {
                id: 1,
                time: 10,
                value: TransportValue::FloatValue(0.5),
            }
        );
    }
}
