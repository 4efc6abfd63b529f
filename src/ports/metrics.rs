//! Metrics Port - Outcome Counters for the Use Cases
//!
//! The use cases report what happened; an adapter decides how it is
//! exported. Implementations must be cheap and never fail.

use std::time::Duration;

use crate::domain::trade::TradeSide;

/// Sink for use-case telemetry.
pub trait MetricsSink: Send + Sync + 'static {
  /// One finished trade attempt. `outcome` is `"ok"` or an error code.
  fn record_trade(&self, side: TradeSide, outcome: &str, elapsed: Duration);

  /// One quote lookup: `"hit"`, `"miss"` or `"error"`.
  fn record_quote_lookup(&self, outcome: &str);

  /// One valuation: `"complete"`, `"partial"` or `"failed"`.
  fn record_valuation(&self, outcome: &str);
}
