// Snapshot -> flat metrics
pub mod mapper;

// Poll-compute-publish loop
pub mod poller;

// Process wiring and shutdown
pub mod system;
