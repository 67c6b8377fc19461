// Per-device canary: watches the inbound webhook stream for sequence gaps,
// dropped continuous sessions, delivery latency, and silence. One lock
// guards the device map; rule evaluation happens under it, message delivery
// outside it.

use crate::models::CanaryEvent;
use crate::notify::Notifier;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

pub const SESSION_NOTEFILE: &str = "_session.qo";
pub const DATA_NOTEFILE: &str = "_temp.qo";

/// Max seconds allowed for routing once an event reaches the hub.
const ROUTE_SECS_MAX: i64 = 10;
/// Sweep warnings stop escalating after this many.
const WARNINGS_MAX: i64 = 10;

/// Per-transport time thresholds. NTN devices ride a satellite transport
/// with a 15-minute packet interval, so their limits are far looser.
struct Thresholds {
    capture_secs_max: i64,
    receive_gap_secs_max: i64,
    sweep_silence_secs: i64,
}

fn thresholds(sn: &str) -> Thresholds {
    if sn.to_ascii_lowercase().starts_with("ntn") {
        Thresholds {
            capture_secs_max: 1200,
            receive_gap_secs_max: 1500,
            sweep_silence_secs: 20 * 60,
        }
    } else {
        Thresholds {
            capture_secs_max: 120,
            receive_gap_secs_max: 5 * 60,
            sweep_silence_secs: 6 * 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct LastEvent {
    session_id: String,
    seq_no: i64,
    captured_time: i64,
    received_time: i64,
    routed_time: i64,
}

#[derive(Debug, Clone, Default)]
struct DeviceState {
    known: bool,
    continuous: bool,
    sn: String,
    warnings: i64,
    last: LastEvent,
}

pub struct Canary {
    devices: Mutex<HashMap<String, DeviceState>>,
    notifier: Arc<Notifier>,
}

impl Canary {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    /// Route one webhook delivery. At most one alert fires per delivery,
    /// in priority order: session drop, sequence gap, capture latency,
    /// routing latency, receive gap. Returns the alert for observability.
    pub async fn handle_event(&self, e: &CanaryEvent, now: i64) -> Option<String> {
        if e.notefile_id == SESSION_NOTEFILE {
            let mut devices = self.devices.lock();
            let d = devices.entry(e.device_uid.clone()).or_default();
            d.known = true;
            if let Some(why) = e.body.as_ref().and_then(|b| b.get("why")).and_then(|w| w.as_str()) {
                d.continuous = why.contains("continuous");
            }
            if !e.device_sn.is_empty() {
                d.sn = e.device_sn.clone();
            }
            return None;
        }

        if e.notefile_id != DATA_NOTEFILE {
            return None;
        }

        let t = LastEvent {
            session_id: e.session_uid.clone(),
            seq_no: e
                .body
                .as_ref()
                .and_then(|b| b.get("count"))
                .and_then(|c| c.as_i64())
                .unwrap_or(0),
            captured_time: e.when,
            received_time: e.received as i64,
            routed_time: now,
        };

        let alert = {
            let mut devices = self.devices.lock();
            let d = devices.entry(e.device_uid.clone()).or_default();
            let alert = if d.known {
                evaluate(d, &t, &e.event_uid)
            } else {
                None
            };
            d.known = true;
            d.last = t;
            alert
        };

        if let Some(msg) = &alert {
            self.notifier.canary(&e.device_uid, msg).await;
        }
        alert
    }

    /// Periodic silence check: devices that have gone quiet get one warning
    /// per sweep, a final "LAST WARNING" on the tenth, then nothing.
    /// Returns the messages sent, newest device order unspecified.
    pub async fn sweep(&self, now: i64) -> Vec<(String, String)> {
        let mut messages: Vec<(String, String)> = Vec::new();
        {
            let mut devices = self.devices.lock();
            for (device_uid, d) in devices.iter_mut() {
                let limits = thresholds(&d.sn);
                let silent_secs = now - d.last.received_time;
                if silent_secs < limits.sweep_silence_secs {
                    continue;
                }
                d.warnings += 1;
                if d.warnings < WARNINGS_MAX {
                    messages.push((
                        device_uid.clone(),
                        format!(
                            "no routed events received in {} minutes (last event received {})",
                            silent_secs / 60,
                            format_time(d.last.received_time)
                        ),
                    ));
                } else if d.warnings == WARNINGS_MAX {
                    messages.push((device_uid.clone(), "LAST WARNING before silence!".to_string()));
                }
            }
        }

        for (device_uid, msg) in &messages {
            self.notifier.canary(device_uid, msg).await;
        }
        messages
    }
}

fn evaluate(d: &DeviceState, t: &LastEvent, event_uid: &str) -> Option<String> {
    let l = &d.last;
    let limits = thresholds(&d.sn);
    if d.continuous && t.session_id != l.session_id {
        Some(format!(
            "continuous session dropped and reconnected: {}",
            t.session_id
        ))
    } else if t.seq_no != l.seq_no + 1 {
        Some(format!(
            "sequence out of order (expected {} but received {}): {event_uid}",
            l.seq_no + 1,
            t.seq_no
        ))
    } else if t.received_time - t.captured_time > limits.capture_secs_max {
        Some(format!(
            "event took {} secs to get from notecard to notehub: {event_uid}",
            t.received_time - t.captured_time
        ))
    } else if t.routed_time - t.received_time > ROUTE_SECS_MAX {
        Some(format!(
            "event took {} secs to be routed once it was received by notehub: {event_uid}",
            t.routed_time - t.received_time
        ))
    } else if t.received_time - l.received_time > limits.receive_gap_secs_max {
        Some(format!(
            "{} minutes between events received by notehub: {event_uid}",
            (t.received_time - l.received_time) / 60
        ))
    } else {
        None
    }
}

fn format_time(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map(|t| t.format("%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
