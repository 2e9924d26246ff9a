//! Background loops for continuous processing.

pub mod plan_worker_loop;
