pub(crate) mod processor;
pub(crate) mod store;
