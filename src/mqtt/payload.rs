//! Outbound record payloads.
//!
//! Every record is a fresh snapshot of live state, serialized to JSON at
//! send time and never persisted. The field layout is fixed by the server
//! infrastructure, which also receives these records from embedded
//! firmware — hence the `esp32_status` field name surviving on a desktop
//! bridge.

use serde::Serialize;

use crate::printer::StatusSnapshot;

/// Fallback WiFi signal strength reported when no radio is readable.
const DEFAULT_RSSI: i32 = -50;

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Periodic liveness broadcast (topic suffix `h`).
#[derive(Debug, Serialize)]
pub struct HeartbeatRecord {
    pub printer_id: String,
    pub timestamp_ms: i64,
    /// Fixed "online": the bridge is alive if this record exists at all.
    pub esp32_status: &'static str,
    pub printer_online: bool,
    pub printer_status: String,
    pub details: HeartbeatDetails,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatDetails {
    pub paper_present: bool,
    pub cover_closed: bool,
    pub cutter_ok: bool,
    pub wifi_connected: bool,
    pub mqtt_connected: bool,
    /// Available system memory in MB (0 when unreadable).
    pub free_heap: u64,
    pub uptime_ms: u64,
    pub wifi_rssi: i32,
    pub local_ip: String,
}

impl HeartbeatRecord {
    pub fn new(
        printer_id: &str,
        snapshot: &StatusSnapshot,
        mqtt_connected: bool,
        uptime_ms: u64,
    ) -> Self {
        Self {
            printer_id: printer_id.to_string(),
            timestamp_ms: now_ms(),
            esp32_status: "online",
            printer_online: snapshot.online,
            printer_status: snapshot.status.as_str().to_string(),
            details: HeartbeatDetails {
                paper_present: snapshot.paper_present,
                cover_closed: snapshot.cover_closed,
                cutter_ok: snapshot.cutter_ok,
                wifi_connected: true,
                mqtt_connected,
                free_heap: free_memory_mb(),
                uptime_ms,
                wifi_rssi: DEFAULT_RSSI,
                local_ip: local_ip(),
            },
        }
    }
}

/// Per-job outcome report (topic suffix `a`).
#[derive(Debug, Serialize)]
pub struct StatusRecord {
    pub timestamp_ms: i64,
    pub printer_id: String,
    pub order_id: String,
    pub page: u32,
    pub status: String,
    /// Wall-clock send time in seconds (fractional).
    pub print_time: f64,
}

impl StatusRecord {
    pub fn new(printer_id: &str, order_id: &str, page: u32, status: &str) -> Self {
        let now = now_ms();
        Self {
            timestamp_ms: now,
            printer_id: printer_id.to_string(),
            order_id: order_id.to_string(),
            page,
            status: status.to_string(),
            print_time: now as f64 / 1000.0,
        }
    }
}

/// Error report (topic suffix `e`).
#[derive(Debug, Serialize)]
pub struct ErrorRecord {
    pub timestamp_ms: i64,
    pub printer_id: String,
    pub error_type: String,
    pub error_message: String,
    pub printer_status: String,
}

impl ErrorRecord {
    pub fn new(printer_id: &str, error_type: &str, error_message: &str, printer_status: &str) -> Self {
        Self {
            timestamp_ms: now_ms(),
            printer_id: printer_id.to_string(),
            error_type: error_type.to_string(),
            error_message: error_message.to_string(),
            printer_status: printer_status.to_string(),
        }
    }
}

/// One-time reconnection report (topic suffix `r`).
#[derive(Debug, Serialize)]
pub struct RecoveryRecord {
    pub timestamp_ms: i64,
    pub printer_id: String,
    pub message: String,
    /// Seconds since the bridge started.
    pub uptime: u64,
    pub reconnect_count: u32,
}

impl RecoveryRecord {
    pub fn new(printer_id: &str, uptime_secs: u64, reconnect_count: u32) -> Self {
        Self {
            timestamp_ms: now_ms(),
            printer_id: printer_id.to_string(),
            message: "Printer bridge recovered and reconnected".to_string(),
            uptime: uptime_secs,
            reconnect_count,
        }
    }
}

// ============================================================================
// SYSTEM PROBES
// ============================================================================

/// Available system memory in MB, from /proc/meminfo. 0 when unreadable.
fn free_memory_mb() -> u64 {
    let Ok(contents) = std::fs::read_to_string("/proc/meminfo") else {
        return 0;
    };
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest
                .trim()
                .trim_end_matches("kB")
                .trim()
                .parse()
                .unwrap_or(0);
            return kb / 1024;
        }
    }
    0
}

/// The local IP used for outbound traffic, determined by a connect-only
/// UDP socket (no packet is sent). Falls back to loopback.
fn local_ip() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::{PrintStats, PrinterStatus};

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            online: true,
            status: PrinterStatus::Ready,
            paper_present: true,
            cover_closed: true,
            cutter_ok: true,
            stats: PrintStats::default(),
        }
    }

    #[test]
    fn test_heartbeat_wire_shape() {
        let record = HeartbeatRecord::new("abc123", &snapshot(), true, 1000);
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["printer_id"], "abc123");
        assert_eq!(value["esp32_status"], "online");
        assert_eq!(value["printer_online"], true);
        assert_eq!(value["printer_status"], "ready");
        assert_eq!(value["details"]["mqtt_connected"], true);
        assert_eq!(value["details"]["uptime_ms"], 1000);
        assert!(value["details"]["local_ip"].is_string());
        assert!(value["timestamp_ms"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_status_record_wire_shape() {
        let record = StatusRecord::new("abc123", "A42", 2, "completed");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["order_id"], "A42");
        assert_eq!(value["page"], 2);
        assert_eq!(value["status"], "completed");
        // print_time is seconds, timestamp_ms is milliseconds
        let ts = value["timestamp_ms"].as_i64().unwrap();
        let pt = value["print_time"].as_f64().unwrap();
        assert!((pt * 1000.0 - ts as f64).abs() < 1.0);
    }

    #[test]
    fn test_error_record_wire_shape() {
        let record = ErrorRecord::new("abc123", "print_failed", "device write failed", "offline");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["error_type"], "print_failed");
        assert_eq!(value["printer_status"], "offline");
    }

    #[test]
    fn test_recovery_record_wire_shape() {
        let record = RecoveryRecord::new("abc123", 120, 3);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["uptime"], 120);
        assert_eq!(value["reconnect_count"], 3);
        assert!(value["message"].as_str().unwrap().contains("reconnected"));
    }
}
