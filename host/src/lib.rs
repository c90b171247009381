// Host tooling for the step-response bench.
//
// Restarts the device over its serial link, collects the streamed samples,
// and compares them against the theoretical RC charging curve. Parsing and
// the time base come from `stepscope-core` so both ends agree on the wire
// format.

pub mod acquire;
pub mod config;
pub mod keys;
pub mod link;
pub mod overlay;
pub mod session;
pub mod sim;
pub mod transcript;
