//! Synthetic in-memory workload.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;

use crate::error::Result;
use crate::sources::MemoryLog;
use crate::traits::{WorkloadGenerator, WorkloadReport};

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Alan", "Barbara", "Edsger", "Frances", "Donald", "Margaret",
];
const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Turing", "Liskov", "Dijkstra", "Allen", "Knuth", "Hamilton",
];
const DEPARTMENTS: &[&str] = &["engineering", "finance", "operations", "sales"];

/// Appends generated employee records to a [`MemoryLog`].
///
/// Values are JSON objects shaped like rows of an `employees` table; keys are
/// the employee id. Records are numbered across calls so every generated
/// employee is distinct.
pub struct SyntheticWorkload {
    name: String,
    log: MemoryLog,
    chunk_size: usize,
}

impl SyntheticWorkload {
    pub fn new(name: &str, log: MemoryLog) -> Self {
        Self {
            name: name.to_string(),
            log,
            chunk_size: 10_000,
        }
    }

    /// Records appended per lock acquisition; readers wake once per chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn employee(id: u64) -> (Option<Bytes>, Bytes) {
        let i = id as usize;
        let value = serde_json::json!({
            "id": id,
            "first_name": FIRST_NAMES[i % FIRST_NAMES.len()],
            "last_name": LAST_NAMES[(i / FIRST_NAMES.len()) % LAST_NAMES.len()],
            "department": DEPARTMENTS[i % DEPARTMENTS.len()],
            "salary": 50_000 + (id % 100) * 1_000,
        });
        (Some(Bytes::from(id.to_string())), Bytes::from(value.to_string()))
    }
}

#[async_trait]
impl WorkloadGenerator for SyntheticWorkload {
    async fn generate(&self, count: u64) -> Result<WorkloadReport> {
        let start = Instant::now();
        let first_id = self
            .log
            .last_position()
            .map(|p| p.to_u64())
            .transpose()?
            .unwrap_or(0)
            + 1;

        let mut generated = 0u64;
        while generated < count {
            let chunk = (count - generated).min(self.chunk_size as u64);
            let ids = first_id + generated..first_id + generated + chunk;
            self.log.append_batch(ids.map(Self::employee));
            generated += chunk;
            tokio::task::yield_now().await;
        }

        let elapsed = start.elapsed();
        tracing::info!(
            generator = %self.name,
            count,
            elapsed_ms = elapsed.as_millis() as u64,
            "synthetic records appended"
        );

        Ok(WorkloadReport {
            requested: count,
            elapsed,
            output: format!("appended {} employee records\n", count),
            exit_code: None,
            success: true,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
