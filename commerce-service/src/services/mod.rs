pub mod database;
pub mod metrics;
pub mod payments;
pub mod settlement;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use payments::{CardDetails, InvoiceSettings, PaymentError, PaymentOrchestrator, PaymentRequest};
pub use settlement::{OrderSettlementCoordinator, SettlementError};
