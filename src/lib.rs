//! Electricity cost, price-efficiency, savings and investment lifecycle
//! calculator over 30-minute interval meter data.

pub mod billing;
pub mod dates;
pub mod engine;
pub mod io;
pub mod lifecycle;
pub mod pei;
pub mod record;
pub mod registry;
pub mod savings;
pub mod summary;
pub mod sync;
pub mod tariff;
