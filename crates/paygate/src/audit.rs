//! Tamper-evident audit log for operation status transitions.
//!
//! Every status transition the daemon performs is appended to a JSONL file
//! where each entry carries an HMAC-SHA256 over its own fields and the
//! previous entry's HMAC. Removing, editing or reordering any line breaks
//! the chain from that point on, which `verify_chain` detects.
//!
//! The HMAC key lives next to the log as `audit.key`, either raw 32 bytes
//! or 64 hex characters. A missing key file is generated on first start so
//! a fresh deployment works without a manual provisioning step.

use alloy_primitives::B256;
use chrono::Utc;
use hmac::{Hmac, Mac};
use paygate_core::types::OpStatus;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type HmacSha256 = Hmac<Sha256>;

/// Chain anchor for the first entry.
const INITIAL_HMAC: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

const LOG_FILE: &str = "audit.jsonl";
const KEY_FILE: &str = "audit.key";
const KEY_LEN: usize = 32;

/// Errors from the audit log.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Reading or writing the log or key file failed.
    #[error("audit io failure: {0}")]
    Io(#[from] std::io::Error),

    /// The key file is neither raw 32 bytes nor 64 hex characters.
    #[error("invalid audit key: {context}")]
    InvalidKey {
        /// What was wrong with the key material.
        context: String,
    },

    /// An existing log line could not be parsed.
    #[error("corrupt audit log: {context}")]
    Corrupt {
        /// Where parsing failed.
        context: String,
    },

    /// The logger's internal mutex was poisoned.
    #[error("audit state lock poisoned")]
    Lock,
}

impl AuditError {
    fn invalid_key(context: impl Into<String>) -> Self {
        Self::InvalidKey {
            context: context.into(),
        }
    }

    fn corrupt(context: impl Into<String>) -> Self {
        Self::Corrupt {
            context: context.into(),
        }
    }
}

/// One status transition as recorded in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number, starting at 1.
    pub seq: u64,
    /// RFC 3339 timestamp of the transition.
    pub timestamp: String,
    /// The mutated operation.
    pub operation_id: i64,
    /// The chain the operation targets.
    pub chain_id: u64,
    /// Canonical operation hash, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_hash: Option<String>,
    /// The previous status.
    pub from_status: String,
    /// The new status.
    pub to_status: String,
    /// Context (rejection reasons, reconciliation notes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// HMAC over this entry and the previous entry's HMAC.
    pub hmac: String,
}

impl AuditEntry {
    /// The canonical byte string the HMAC covers. Field order is part of
    /// the format; `prev` chains to the preceding entry.
    fn canonical(&self, prev: &str) -> String {
        format!(
            "{}||{}||{}||{}||{}||{}||{}||{}||{}",
            self.seq,
            self.timestamp,
            self.operation_id,
            self.chain_id,
            self.op_hash.as_deref().unwrap_or("-"),
            self.from_status,
            self.to_status,
            self.note.as_deref().unwrap_or("-"),
            prev,
        )
    }
}

/// Outcome of a full chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyResult {
    /// `true` when every entry's HMAC and sequence check out.
    pub valid: bool,
    /// Entries examined before stopping.
    pub entries_checked: u64,
    /// Sequence number of the first bad entry, when invalid.
    pub first_invalid_seq: Option<u64>,
    /// Why verification stopped, when invalid.
    pub error_message: Option<String>,
}

#[derive(Debug)]
struct ChainState {
    seq: u64,
    last_hmac: String,
}

/// Append-only, HMAC-chained transition log.
#[derive(Debug)]
pub struct AuditLogger {
    path: PathBuf,
    key: Vec<u8>,
    state: Mutex<ChainState>,
}

impl AuditLogger {
    /// Opens (or creates) the log under `dir` with the given key,
    /// restoring the chain state from any existing entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] on filesystem failure and
    /// [`AuditError::Corrupt`] when the existing log does not parse.
    pub fn new(dir: &Path, key: Vec<u8>) -> Result<Self, AuditError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILE);
        let state = Self::restore_state(&path)?;
        Ok(Self {
            path,
            key,
            state: Mutex::new(state),
        })
    }

    /// Opens the log under `dir`, loading the HMAC key from `audit.key`.
    /// A missing key file is generated with 32 random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidKey`] for malformed key material, plus
    /// the errors of [`AuditLogger::new`].
    pub fn from_config(dir: &Path) -> Result<Self, AuditError> {
        std::fs::create_dir_all(dir)?;
        let key_path = dir.join(KEY_FILE);
        let key = if key_path.exists() {
            Self::load_key(&key_path)?
        } else {
            let mut key = vec![0u8; KEY_LEN];
            rand::rngs::OsRng.fill_bytes(&mut key);
            std::fs::write(&key_path, &key)?;
            key
        };
        Self::new(dir, key)
    }

    fn load_key(path: &Path) -> Result<Vec<u8>, AuditError> {
        let raw = std::fs::read(path)?;
        if raw.len() == KEY_LEN {
            return Ok(raw);
        }
        let text = String::from_utf8(raw)
            .map_err(|_| AuditError::invalid_key("not raw 32 bytes and not UTF-8"))?;
        let trimmed = text.trim();
        if trimmed.len() == KEY_LEN * 2 {
            return hex::decode(trimmed)
                .map_err(|_| AuditError::invalid_key("64 characters but not valid hex"));
        }
        Err(AuditError::invalid_key(format!(
            "expected raw {KEY_LEN} bytes or {} hex characters",
            KEY_LEN * 2
        )))
    }

    fn restore_state(path: &Path) -> Result<ChainState, AuditError> {
        if !path.exists() {
            return Ok(ChainState {
                seq: 0,
                last_hmac: INITIAL_HMAC.to_string(),
            });
        }
        let file = File::open(path)?;
        let mut last: Option<AuditEntry> = None;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = serde_json::from_str(&line)
                .map_err(|e| AuditError::corrupt(format!("line {}: {e}", index + 1)))?;
            last = Some(entry);
        }
        Ok(match last {
            Some(entry) => ChainState {
                seq: entry.seq,
                last_hmac: entry.hmac,
            },
            None => ChainState {
                seq: 0,
                last_hmac: INITIAL_HMAC.to_string(),
            },
        })
    }

    #[allow(clippy::expect_used)]
    fn compute_hmac(&self, data: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Appends one status transition to the log.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] when the append fails; the in-memory
    /// chain state is only advanced after a successful write.
    pub fn log_transition(
        &self,
        operation_id: i64,
        chain_id: u64,
        op_hash: Option<B256>,
        from: OpStatus,
        to: OpStatus,
        note: Option<&str>,
    ) -> Result<(), AuditError> {
        let mut state = self.state.lock().map_err(|_| AuditError::Lock)?;
        let mut entry = AuditEntry {
            seq: state.seq + 1,
            timestamp: Utc::now().to_rfc3339(),
            operation_id,
            chain_id,
            op_hash: op_hash.map(|h| h.to_string()),
            from_status: from.as_str().to_string(),
            to_status: to.as_str().to_string(),
            note: note.map(ToString::to_string),
            hmac: String::new(),
        };
        entry.hmac = self.compute_hmac(&entry.canonical(&state.last_hmac));

        let line = serde_json::to_string(&entry)
            .map_err(|e| AuditError::corrupt(format!("serialization: {e}")))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        state.seq = entry.seq;
        state.last_hmac = entry.hmac;
        Ok(())
    }

    /// Verifies the whole chain from the first entry.
    ///
    /// A broken HMAC or sequence gap stops verification at that entry;
    /// everything before it is reported as checked.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] only for filesystem failures; tampering
    /// is reported through the returned [`VerifyResult`].
    pub fn verify_chain(&self) -> Result<VerifyResult, AuditError> {
        if !self.path.exists() {
            return Ok(VerifyResult {
                valid: true,
                entries_checked: 0,
                first_invalid_seq: None,
                error_message: None,
            });
        }
        let file = File::open(&self.path)?;
        let mut prev = INITIAL_HMAC.to_string();
        let mut expected_seq = 1u64;
        let mut checked = 0u64;

        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AuditEntry = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    return Ok(VerifyResult {
                        valid: false,
                        entries_checked: checked,
                        first_invalid_seq: Some(expected_seq),
                        error_message: Some(format!("line {}: {e}", index + 1)),
                    });
                }
            };
            if entry.seq != expected_seq {
                return Ok(VerifyResult {
                    valid: false,
                    entries_checked: checked,
                    first_invalid_seq: Some(entry.seq),
                    error_message: Some(format!(
                        "sequence gap: expected {expected_seq}, found {}",
                        entry.seq
                    )),
                });
            }
            let computed = self.compute_hmac(&entry.canonical(&prev));
            if computed != entry.hmac {
                return Ok(VerifyResult {
                    valid: false,
                    entries_checked: checked,
                    first_invalid_seq: Some(entry.seq),
                    error_message: Some(format!("hmac mismatch at seq {}", entry.seq)),
                });
            }
            prev = entry.hmac;
            expected_seq += 1;
            checked += 1;
        }

        Ok(VerifyResult {
            valid: true,
            entries_checked: checked,
            first_invalid_seq: None,
            error_message: None,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use tempfile::TempDir;

    fn logger(dir: &TempDir) -> AuditLogger {
        AuditLogger::new(dir.path(), vec![0x42; 32]).expect("logger")
    }

    fn log_one(logger: &AuditLogger, id: i64, from: OpStatus, to: OpStatus) {
        logger
            .log_transition(id, 8453, None, from, to, None)
            .expect("log");
    }

    #[test]
    fn test_empty_log_verifies() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        let result = logger.verify_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.entries_checked, 0);
    }

    #[test]
    fn test_chain_verifies_after_appends() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        log_one(&logger, 1, OpStatus::Signed, OpStatus::Executed);
        log_one(&logger, 2, OpStatus::Pending, OpStatus::ValidationFailed);

        let result = logger.verify_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.entries_checked, 3);
    }

    #[test]
    fn test_state_restored_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let logger = logger(&dir);
            log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        }
        let logger = logger(&dir);
        log_one(&logger, 1, OpStatus::Signed, OpStatus::Executed);

        let result = logger.verify_chain().unwrap();
        assert!(result.valid);
        assert_eq!(result.entries_checked, 2);
    }

    #[test]
    fn test_tampered_entry_detected() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        log_one(&logger, 2, OpStatus::Pending, OpStatus::Signed);

        let path = dir.path().join(LOG_FILE);
        let tampered = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"operation_id\":1", "\"operation_id\":9");
        std::fs::write(&path, tampered).unwrap();

        let result = logger.verify_chain().unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_invalid_seq, Some(1));
        assert_eq!(result.entries_checked, 0);
    }

    #[test]
    fn test_deleted_entry_breaks_sequence() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        log_one(&logger, 2, OpStatus::Pending, OpStatus::Signed);

        let path = dir.path().join(LOG_FILE);
        let content = std::fs::read_to_string(&path).unwrap();
        let second_line = content.lines().nth(1).unwrap();
        std::fs::write(&path, format!("{second_line}\n")).unwrap();

        let result = logger.verify_chain().unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_invalid_seq, Some(2));
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let dir = TempDir::new().unwrap();
        {
            let logger = logger(&dir);
            log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        }
        let other = AuditLogger::new(dir.path(), vec![0x43; 32]).expect("logger");
        let result = other.verify_chain().unwrap();
        assert!(!result.valid);
        assert_eq!(result.first_invalid_seq, Some(1));
    }

    #[test]
    fn test_from_config_generates_key_once() {
        let dir = TempDir::new().unwrap();
        {
            let logger = AuditLogger::from_config(dir.path()).expect("logger");
            log_one(&logger, 1, OpStatus::Pending, OpStatus::Signed);
        }
        let key = std::fs::read(dir.path().join(KEY_FILE)).unwrap();
        assert_eq!(key.len(), KEY_LEN);

        // reopening with the same generated key keeps the chain valid
        let logger = AuditLogger::from_config(dir.path()).expect("logger");
        assert!(logger.verify_chain().unwrap().valid);
    }

    #[test]
    fn test_hex_key_file_accepted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(KEY_FILE), "ab".repeat(32)).unwrap();
        let logger = AuditLogger::from_config(dir.path()).expect("logger");
        assert_eq!(logger.key, vec![0xab; 32]);
    }

    #[test]
    fn test_malformed_key_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(KEY_FILE), "too short").unwrap();
        assert!(matches!(
            AuditLogger::from_config(dir.path()),
            Err(AuditError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_entry_records_hash_and_note() {
        let dir = TempDir::new().unwrap();
        let logger = logger(&dir);
        logger
            .log_transition(
                7,
                8453,
                Some(B256::from([0xab; 32])),
                OpStatus::Pending,
                OpStatus::ValidationFailed,
                Some("policy 1: budget exceeded"),
            )
            .expect("log");

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        let entry: AuditEntry = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(entry.operation_id, 7);
        assert_eq!(entry.from_status, "pending");
        assert_eq!(entry.to_status, "validation_failed");
        assert!(entry.op_hash.as_deref().unwrap_or("").starts_with("0x"));
        assert_eq!(entry.note.as_deref(), Some("policy 1: budget exceeded"));
    }
}
