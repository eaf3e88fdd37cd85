/// Lifecycle event logging for bot modules
/// Structured record of every terminal failure, strike, and rejected call,
/// emitted through the `log` facade and optionally appended as JSON lines
/// to an audit file.
use crate::config::types::{CoordinatorError, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::SystemTime;
use uuid::Uuid;

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// Types of lifecycle events we track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotEventType {
    // Setup
    ModuleKickoff,
    ModuleReady,
    InitFailure,
    InstantiateFailure,
    SetupTimeout,

    // Tick enforcement
    SoftOverrun,
    StrikeOut,
    TickTimeout,
    TickRuntimeError,
    TickRejected,

    // Teardown
    ContextLost,
    Disposed,
}

impl BotEventType {
    /// Get the default severity for this event type
    pub fn default_severity(&self) -> Severity {
        match self {
            BotEventType::ModuleKickoff => Severity::Low,
            BotEventType::ModuleReady => Severity::Low,
            BotEventType::InitFailure => Severity::High,
            BotEventType::InstantiateFailure => Severity::High,
            BotEventType::SetupTimeout => Severity::High,

            BotEventType::SoftOverrun => Severity::Medium,
            BotEventType::StrikeOut => Severity::High,
            BotEventType::TickTimeout => Severity::High,
            BotEventType::TickRuntimeError => Severity::High,
            BotEventType::TickRejected => Severity::Medium,

            BotEventType::ContextLost => Severity::Critical,
            BotEventType::Disposed => Severity::Low,
        }
    }
}

/// Individual lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotEvent {
    pub event_type: BotEventType,
    pub severity: Severity,
    pub timestamp: SystemTime,
    pub details: String,

    // Correlation
    pub module_id: Option<Uuid>,
    pub program_fingerprint: Option<String>,
    pub tick: Option<u64>,

    // Timing context
    pub elapsed_ms: Option<u64>,
    pub strikes: Option<u32>,
}

impl BotEvent {
    /// Create a new event with default severity
    pub fn new(event_type: BotEventType, details: impl Into<String>) -> Self {
        Self {
            event_type,
            severity: event_type.default_severity(),
            timestamp: SystemTime::now(),
            details: details.into(),
            module_id: None,
            program_fingerprint: None,
            tick: None,
            elapsed_ms: None,
            strikes: None,
        }
    }

    pub fn with_module(mut self, module_id: Uuid) -> Self {
        self.module_id = Some(module_id);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<&str>) -> Self {
        self.program_fingerprint = fingerprint.map(str::to_string);
        self
    }

    pub fn with_tick(mut self, tick: u64) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_strikes(mut self, strikes: u32) -> Self {
        self.strikes = Some(strikes);
        self
    }

    fn to_json(&self) -> serde_json::Value {
        let mut entry = serde_json::json!({
            "timestamp": self.timestamp
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            "event_type": self.event_type,
            "severity": self.severity,
            "details": self.details,
            "process_id": std::process::id(),
        });

        if let Some(module_id) = &self.module_id {
            entry["module_id"] = serde_json::json!(module_id.to_string());
        }
        if let Some(fingerprint) = &self.program_fingerprint {
            entry["program_fingerprint"] = serde_json::json!(fingerprint);
        }
        if let Some(tick) = self.tick {
            entry["tick"] = serde_json::json!(tick);
        }
        if let Some(elapsed_ms) = self.elapsed_ms {
            entry["elapsed_ms"] = serde_json::json!(elapsed_ms);
        }
        if let Some(strikes) = self.strikes {
            entry["strikes"] = serde_json::json!(strikes);
        }
        entry
    }
}

/// Append-only JSON-lines audit trail
pub struct AuditLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoordinatorError::Config(format!("Failed to create audit log directory: {}", e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CoordinatorError::Config(format!("Failed to open audit log: {}", e)))?;

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn append(&self, event: &BotEvent) {
        let entry = event.to_json();
        match self.file.lock() {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", entry) {
                    error!("Failed to write to audit log: {}", e);
                }
                if let Err(e) = file.flush() {
                    error!("Failed to flush audit log: {}", e);
                }
            }
            Err(_) => error!("Failed to acquire lock on audit log"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

static AUDIT_LOG: OnceLock<AuditLog> = OnceLock::new();

/// Install the process-wide audit file. Events are only logged until this runs.
pub fn init_audit_log(path: &Path) -> Result<()> {
    let log = AuditLog::open(path)?;
    if AUDIT_LOG.set(log).is_err() {
        warn!("Audit log already initialized; ignoring {}", path.display());
    } else {
        info!("Audit log initialized at {}", path.display());
    }
    Ok(())
}

/// Report an event through the logger and, if installed, the audit file
pub fn record(event: BotEvent) {
    let module = event
        .module_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    match event.severity {
        Severity::Critical | Severity::High => {
            error!("BOT {}: {:?} - {}", module, event.event_type, event.details);
        }
        Severity::Medium => {
            warn!("BOT {}: {:?} - {}", module, event.event_type, event.details);
        }
        Severity::Low => {
            info!("BOT {}: {:?} - {}", module, event.event_type, event.details);
        }
    }

    if let Some(log) = AUDIT_LOG.get() {
        log.append(&event);
    }
}

/// SHA-256 of a guest program, hex encoded.
pub fn program_fingerprint(program: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(program);
    format!("{:x}", hasher.finalize())
}
