//! Collaborator traits.
//!
//! Defines the [`StreamSource`] / [`StreamHandle`] capability the drain loop
//! reads from and the [`WorkloadGenerator`] capability the harness uses to
//! put records into the backing store. Both are injected as trait objects so
//! tests can substitute fakes.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::position::Position;
use crate::record::RecordBatch;

/// A resumable, position-tracked record stream.
#[async_trait]
pub trait StreamSource: Send + Sync {
    /// Open the stream.
    ///
    /// `None` (or an empty position) starts from the beginning of the retained
    /// history. `Some(p)` resumes strictly after the record whose delivery
    /// produced `p`.
    ///
    /// Fails with `SourceUnavailable` if the store cannot be reached and with
    /// `InvalidCursor` if `p` is malformed or refers to discarded history.
    async fn open(&self, position: Option<&Position>) -> Result<Box<dyn StreamHandle>>;

    /// Return the name of this source, used in logs.
    fn name(&self) -> &str;
}

/// An open stream, read in bounded batches.
#[async_trait]
pub trait StreamHandle: Send {
    /// Read up to `max` records.
    ///
    /// Waits until at least one record is available or the source's idle
    /// timeout elapses, in which case it returns an empty batch. Returning
    /// more than `max` records breaks the contract.
    async fn read_up_to(&mut self, max: usize) -> Result<RecordBatch>;

    /// Release the handle. Errors here are reported, never fatal.
    async fn close(&mut self) -> Result<()>;
}

/// Outcome of asking the generator for records.
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    /// Number of records requested.
    pub requested: u64,
    /// Wall-clock time the generator took.
    pub elapsed: Duration,
    /// Combined textual output, kept for diagnostics only.
    pub output: String,
    /// Process exit code, when the generator is a process.
    pub exit_code: Option<i32>,
    /// Whether the generator reported success.
    pub success: bool,
}

impl WorkloadReport {
    /// Insert rate in records per second, `None` when no time elapsed.
    pub fn rate(&self) -> Option<f64> {
        crate::throughput::rate(self.requested, self.elapsed)
    }
}

/// Produces records into the store backing a [`StreamSource`].
#[async_trait]
pub trait WorkloadGenerator: Send + Sync {
    /// Produce `count` records and block until done.
    ///
    /// A generator that ran but failed returns `Ok` with `success == false`
    /// and its output; errors are reserved for not being able to run at all.
    async fn generate(&self, count: u64) -> Result<WorkloadReport>;

    /// Return the name of this generator, used in logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use bytes::Bytes;

    struct MockHandle {
        remaining: u64,
        next: u64,
    }

    #[async_trait]
    impl StreamHandle for MockHandle {
        async fn read_up_to(&mut self, max: usize) -> Result<RecordBatch> {
            let n = (max as u64).min(self.remaining);
            let records = (0..n)
                .map(|i| Record::new(Position::from_u64(self.next + i), None, Bytes::new()))
                .collect();
            self.next += n;
            self.remaining -= n;
            Ok(RecordBatch::new(records))
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct MockSource;

    #[async_trait]
    impl StreamSource for MockSource {
        async fn open(&self, position: Option<&Position>) -> Result<Box<dyn StreamHandle>> {
            let next = match Position::resume_point(position) {
                Some(p) => p.to_u64()? + 1,
                None => 1,
            };
            Ok(Box::new(MockHandle { remaining: 3, next }))
        }
        fn name(&self) -> &str {
            "mock-source"
        }
    }

    struct MockGenerator;

    #[async_trait]
    impl WorkloadGenerator for MockGenerator {
        async fn generate(&self, count: u64) -> Result<WorkloadReport> {
            Ok(WorkloadReport {
                requested: count,
                elapsed: Duration::from_millis(500),
                output: String::new(),
                exit_code: Some(0),
                success: true,
            })
        }
        fn name(&self) -> &str {
            "mock-generator"
        }
    }

    #[test]
    fn test_traits_are_object_safe() {
        let source = MockSource;
        let _: &dyn StreamSource = &source;
        let generator = MockGenerator;
        let _: &dyn WorkloadGenerator = &generator;
    }

    #[tokio::test]
    async fn test_mock_source_lifecycle() {
        let source = MockSource;
        let mut handle = source.open(Some(&Position::from_u64(9))).await.unwrap();

        let batch = handle.read_up_to(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.records()[0].position.to_u64().unwrap(), 10);

        let batch = handle.read_up_to(2).await.unwrap();
        assert_eq!(batch.len(), 1);
        handle.close().await.unwrap();
        assert_eq!(source.name(), "mock-source");
    }

    #[tokio::test]
    async fn test_workload_report_rate() {
        let report = MockGenerator.generate(1000).await.unwrap();
        assert_eq!(report.rate(), Some(2000.0));

        let instant = WorkloadReport {
            elapsed: Duration::ZERO,
            ..report
        };
        assert!(instant.rate().is_none());
    }
}
