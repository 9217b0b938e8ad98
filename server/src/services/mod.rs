pub mod accounts;
pub mod review;
pub mod workflow;

pub use accounts::{AccountError, AccountService, PhotoUpload, Registration};
pub use review::ReviewQueue;
pub use workflow::{ApplicationWorkflow, PassRecord, PaymentOutcome, WorkflowError};
