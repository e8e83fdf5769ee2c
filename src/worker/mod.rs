pub mod run_worker;

pub use run_worker::{RunQueue, RunTicket, RunWorker};
