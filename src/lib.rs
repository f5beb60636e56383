pub mod config;
pub mod db;
pub mod models;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;
