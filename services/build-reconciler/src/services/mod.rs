pub mod callback;
pub mod controller;
pub mod kubernetes_store;
#[cfg(test)]
pub mod memory_store;
pub mod reconciler;
pub mod store;
