pub mod broker;
pub mod events;
pub mod expiry;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod fixtures;
