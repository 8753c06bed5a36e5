pub mod firewall;
pub mod fixtures;
pub mod validation;
