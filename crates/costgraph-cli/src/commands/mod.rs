pub mod add;
pub mod cost;
pub mod delete;
pub mod dep;
pub mod diff;
pub mod edit;
pub mod init;
pub mod show;
pub mod units;
