pub mod constants;
pub mod grant_store;
pub mod grid;
pub mod phase_clock;
pub mod reward;
pub mod rng;
pub mod server_protocol;
pub mod session;
pub mod types;
pub mod world;
