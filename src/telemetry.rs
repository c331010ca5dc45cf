//! Telemetry utilities for operation timing and tracing spans.

use std::time::Instant;

/// Guard for timing one core operation and recording metrics.
///
/// Records operation latency when dropped.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    /// Pass a result through, counting it as an error of its class if it failed.
    pub fn finish<T>(
        self,
        result: crate::error::ServiceResult<T>,
    ) -> crate::error::ServiceResult<T> {
        if let Err(ref e) = result {
            crate::metrics::record_operation_error(self.operation, e.error_code());
        }
        result
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_operation(self.operation, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for a core operation.
    pub fn operation(name: &str, actor: &str, target: Option<&str>) -> Span {
        if let Some(target) = target {
            info_span!("operation", name = %name, actor = %actor, target = %target)
        } else {
            info_span!("operation", name = %name, actor = %actor)
        }
    }

    /// Create a span for a side effect delivered by the worker.
    pub fn effect(kind: &str) -> Span {
        info_span!("effect", kind = %kind)
    }
}
