pub mod whitelist;

pub use whitelist::{is_trusted, AddressError, Whitelist, WhitelistEntry};
