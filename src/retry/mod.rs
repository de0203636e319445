/// Retry policies for resilient operations

pub mod policy;

pub use policy::RetryPolicy;
