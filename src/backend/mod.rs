// Configuration backend (REST) client and refresh loop

mod client;
mod refresh;

#[cfg(test)]
mod tests;

pub use client::{BackendClient, BackendConfig, CONDITION_FEATURE};
pub use refresh::run_refresh_loop;
