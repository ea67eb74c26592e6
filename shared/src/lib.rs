pub mod constants;
pub mod ledger;
pub mod models;
pub mod notice;
pub mod rate_limit;
pub mod reward_flow;
pub mod validation;
pub mod wheel;
