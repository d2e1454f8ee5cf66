pub mod metrics;
pub mod network;
pub mod records;
pub mod status;
pub mod util;
